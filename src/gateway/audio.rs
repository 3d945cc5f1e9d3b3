//! Upload normalization: any common container in, mono 16-bit PCM WAV out.
//!
//! Uploads are staged in temporary files that are removed when they go out of
//! scope, so every exit path (including decode failures) cleans up.

use crate::gateway::{AdapterFailure, AudioUpload, TRANSCRIPTION};
use log::debug;
use std::io::Write;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

fn failure(reason: impl Into<String>) -> AdapterFailure {
    AdapterFailure::new(TRANSCRIPTION, reason)
}

/// Normalizes an upload off the async runtime.
pub async fn normalize_upload(upload: AudioUpload) -> Result<Vec<u8>, AdapterFailure> {
    tokio::task::spawn_blocking(move || normalize(&upload))
        .await
        .map_err(|e| failure(e.to_string()))?
}

pub fn normalize(upload: &AudioUpload) -> Result<Vec<u8>, AdapterFailure> {
    normalize_in(&std::env::temp_dir(), upload)
}

/// Same as [`normalize`], staging the intermediate files under `dir`.
pub fn normalize_in(dir: &Path, upload: &AudioUpload) -> Result<Vec<u8>, AdapterFailure> {
    if upload.bytes.is_empty() {
        return Err(failure("audio upload is empty"));
    }

    let extension = upload.extension();
    let suffix = extension
        .as_deref()
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();

    let mut staged = tempfile::Builder::new()
        .prefix("upload-")
        .suffix(&suffix)
        .tempfile_in(dir)
        .map_err(|e| failure(format!("staging upload failed: {e}")))?;
    staged
        .write_all(&upload.bytes)
        .and_then(|_| staged.flush())
        .map_err(|e| failure(format!("staging upload failed: {e}")))?;

    let (samples, sample_rate) = decode_mono(staged.path(), extension.as_deref())?;
    debug!(
        "decoded {} mono samples at {sample_rate} Hz",
        samples.len()
    );

    let wav = tempfile::Builder::new()
        .prefix("normalized-")
        .suffix(".wav")
        .tempfile_in(dir)
        .map_err(|e| failure(format!("staging wav failed: {e}")))?;
    write_wav(wav.path(), &samples, sample_rate)?;

    std::fs::read(wav.path()).map_err(|e| failure(format!("reading wav failed: {e}")))
}

/// Decodes the first audio track and averages its channels.
fn decode_mono(path: &Path, extension: Option<&str>) -> Result<(Vec<f32>, u32), AdapterFailure> {
    let source = std::fs::File::open(path).map_err(|e| failure(e.to_string()))?;
    let stream = MediaSourceStream::new(Box::new(source), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| failure(format!("unsupported audio container: {e}")))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| failure("no supported audio tracks found in input"))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| failure(format!("unsupported codec: {e}")))?;

    let mut mono = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(failure(format!("reading audio failed: {e}"))),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // corrupt frame, keep going
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(failure(format!("decoding audio failed: {e}"))),
        };

        let spec = *decoded.spec();
        sample_rate = spec.rate;
        let channels = spec.channels.count().max(1);

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        mono.extend(
            buffer
                .samples()
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
        );
    }

    if mono.is_empty() || sample_rate == 0 {
        return Err(failure("no audio samples decoded"));
    }
    Ok((mono, sample_rate))
}

fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<(), AdapterFailure> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| failure(format!("writing wav failed: {e}")))?;
    for sample in samples {
        let pcm = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
        writer
            .write_sample(pcm)
            .map_err(|e| failure(format!("writing wav failed: {e}")))?;
    }
    writer
        .finalize()
        .map_err(|e| failure(format!("writing wav failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn stereo_wav(frames: usize) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 44_100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut bytes = Vec::new();
        let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), spec).unwrap();
        for _ in 0..frames {
            writer.write_sample(8_000i16).unwrap();
            writer.write_sample(-8_000i16).unwrap();
        }
        writer.finalize().unwrap();
        bytes
    }

    #[test]
    fn test_stereo_upload_becomes_mono_wav() {
        let upload = AudioUpload::new(stereo_wav(1_000), Some("note.wav".to_owned()));
        let wav = normalize(&upload).unwrap();

        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(spec.sample_rate, 44_100);
        assert_eq!(reader.duration(), 1_000);
    }

    #[test]
    fn test_garbage_upload_is_adapter_failure() {
        let upload = AudioUpload::new(b"definitely not audio".to_vec(), Some("x.mp3".to_owned()));
        let failure = normalize(&upload).unwrap_err();
        assert_eq!(failure.service, TRANSCRIPTION);
    }

    fn staged_files(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_staged_files_removed_on_every_path() {
        let dir = tempfile::tempdir().unwrap();

        let upload = AudioUpload::new(stereo_wav(500), Some("note.wav".to_owned()));
        assert!(normalize_in(dir.path(), &upload).is_ok());
        assert_eq!(staged_files(dir.path()), 0);

        let upload = AudioUpload::new(b"definitely not audio".to_vec(), Some("x.ogg".to_owned()));
        assert!(normalize_in(dir.path(), &upload).is_err());
        assert_eq!(staged_files(dir.path()), 0);

        // a header that probes as WAV but carries no samples fails after staging
        let upload = AudioUpload::new(stereo_wav(0), Some("empty.wav".to_owned()));
        assert!(normalize_in(dir.path(), &upload).is_err());
        assert_eq!(staged_files(dir.path()), 0);
    }

    #[test]
    fn test_empty_upload_is_rejected() {
        let failure = normalize(&AudioUpload::new(vec![], None)).unwrap_err();
        assert!(failure.reason.contains("empty"));
    }
}
