use anyhow::{anyhow, Result};
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::time::Duration;

struct WavInfo {
    byte_rate: u32,
    data_size: u32,
}

fn scan_wav(bytes: &[u8]) -> Result<WavInfo> {
    let mut f = Cursor::new(bytes);

    // Check RIFF
    let mut id = [0u8; 4];
    f.read_exact(&mut id)?;
    if &id != b"RIFF" {
        return Err(anyhow!("Not a RIFF file"));
    }

    // Skip File Size
    f.seek(SeekFrom::Current(4))?;

    // Check WAVE
    f.read_exact(&mut id)?;
    if &id != b"WAVE" {
        return Err(anyhow!("Not a WAVE file"));
    }

    let mut byte_rate: Option<u32> = None;
    let mut data_size: Option<u32> = None;

    loop {
        let mut chunk_id = [0u8; 4];
        let n = f.read(&mut chunk_id)?;
        if n == 0 {
            break;
        }
        if n < 4 {
            return Err(anyhow!("Unexpected EOF reading chunk ID"));
        }

        let mut size_buf = [0u8; 4];
        f.read_exact(&mut size_buf)?;
        let chunk_size = u32::from_le_bytes(size_buf);

        if &chunk_id == b"fmt " {
            let mut buf = vec![0u8; chunk_size as usize];
            f.read_exact(&mut buf)?;
            if buf.len() < 12 {
                return Err(anyhow!("fmt chunk too short"));
            }
            byte_rate = Some(u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]));
        } else if &chunk_id == b"data" {
            // Streamed WAVs (e.g. from TTS services) may carry a placeholder
            // size; trust the bytes actually present.
            let remaining = bytes.len() as u64 - f.position();
            data_size = Some(chunk_size.min(remaining as u32));
            break;
        } else {
            // Chunks are word aligned.
            let skip = chunk_size as i64 + (chunk_size % 2) as i64;
            f.seek(SeekFrom::Current(skip))?;
        }
    }

    Ok(WavInfo {
        byte_rate: byte_rate.ok_or_else(|| anyhow!("Missing fmt chunk"))?,
        data_size: data_size.ok_or_else(|| anyhow!("Missing data chunk"))?,
    })
}

/// Playback length of a PCM WAV clip, from its header.
pub fn wav_duration(bytes: &[u8]) -> Result<Duration> {
    let info = scan_wav(bytes)?;
    if info.byte_rate == 0 {
        return Err(anyhow!("WAV byte rate is zero"));
    }
    Ok(Duration::from_nanos(
        info.data_size as u64 * 1_000_000_000 / info.byte_rate as u64,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::speech::testing::silent_wav;

    #[test]
    fn test_wav_duration_from_header() {
        let wav = silent_wav(1500);
        assert_eq!(wav_duration(&wav).unwrap(), Duration::from_millis(1500));
    }

    #[test]
    fn test_wav_duration_skips_unknown_chunks() {
        let plain = silent_wav(250);
        // Insert a LIST chunk (odd size, padded) between fmt and data.
        let mut wav = plain[..36].to_vec();
        wav.extend_from_slice(b"LIST");
        wav.extend_from_slice(&3u32.to_le_bytes());
        wav.extend_from_slice(&[1, 2, 3, 0]);
        wav.extend_from_slice(&plain[36..]);
        assert_eq!(wav_duration(&wav).unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn test_streamed_placeholder_size_is_clamped() {
        let mut wav = silent_wav(500);
        // data chunk size lives at byte 40
        wav[40..44].copy_from_slice(&u32::MAX.to_le_bytes());
        assert_eq!(wav_duration(&wav).unwrap(), Duration::from_millis(500));
    }

    #[test]
    fn test_rejects_non_wav() {
        assert!(wav_duration(b"ID3\x04not a wav file").is_err());
        assert!(wav_duration(b"RIFF").is_err());
    }
}
