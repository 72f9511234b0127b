//! Audio cooking: probes WAV (uncompressed PCM) and Ogg Vorbis sources and
//! packs them into a chunked blob. PCM data is split at 4096-frame
//! boundaries so a player can stream chunk by chunk; Ogg data is kept
//! compressed and split at 64 KiB boundaries. The chunk table precedes the
//! sample data inside the payload and every chunk offset is
//! payload-relative.

use std::path::Path;

use sable_shared::{
    byteorder::{ByteOrder, LittleEndian},
    thiserror,
};

use crate::{
    blob::{
        audio_bytes_per_sample, AudioBlobDesc, AudioChunk, BlobHeader, AUDIO_CODEC_OGG_VORBIS,
        AUDIO_CODEC_PCM, AUDIO_SAMPLE_FORMAT_PCM16, AUDIO_SAMPLE_FORMAT_PCM32F,
    },
    common::{extract_extension_from_path, AssetType},
    registry::AudioDesc,
};

const PCM_FRAMES_PER_CHUNK: u32 = 4096;
const OGG_CHUNK_BYTES: u32 = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unsupported audio source format: {0}")]
    UnsupportedFormat(String),
    #[error("Malformed WAV data: {0}")]
    MalformedWav(String),
    #[error("Malformed Ogg Vorbis data: {0}")]
    MalformedOgg(String),
    #[error("Audio stream is empty")]
    Empty,
}

impl From<Error> for crate::Error {
    fn from(value: Error) -> Self {
        crate::Error::Other(Box::new(value))
    }
}

/// Cooked audio blob plus the summary descriptor for the registry.
#[derive(Debug, Clone)]
pub struct CookedAudio {
    pub blob: Vec<u8>,
    pub desc: AudioDesc,
}

fn read_u16(bytes: &[u8], offset: usize) -> Option<u16> {
    bytes.get(offset..offset + 2).map(LittleEndian::read_u16)
}

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    bytes.get(offset..offset + 4).map(LittleEndian::read_u32)
}

fn read_u64(bytes: &[u8], offset: usize) -> Option<u64> {
    bytes.get(offset..offset + 8).map(LittleEndian::read_u64)
}

fn match_tag(bytes: &[u8], offset: usize, tag: &[u8; 4]) -> bool {
    bytes.get(offset..offset + 4).map(|slice| slice == tag).unwrap_or(false)
}

struct WavInfo {
    channels: u32,
    sample_rate: u32,
    sample_format: u32,
    frame_count: u32,
    data: Vec<u8>,
}

fn parse_wav(bytes: &[u8]) -> Result<WavInfo, Error> {
    if bytes.len() < 12 || !match_tag(bytes, 0, b"RIFF") || !match_tag(bytes, 8, b"WAVE") {
        return Err(Error::MalformedWav("missing RIFF/WAVE header".to_owned()));
    }

    let mut offset = 12usize;
    let mut audio_format = 0u16;
    let mut channels = 0u16;
    let mut sample_rate = 0u32;
    let mut block_align = 0u16;
    let mut bits_per_sample = 0u16;
    let mut has_fmt = false;
    let mut data: Option<Vec<u8>> = None;

    while offset + 8 <= bytes.len() {
        let chunk_size = read_u32(bytes, offset + 4)
            .ok_or_else(|| Error::MalformedWav("truncated chunk header".to_owned()))?
            as usize;
        let chunk_data_offset = offset + 8;
        if chunk_data_offset + chunk_size > bytes.len() {
            return Err(Error::MalformedWav("chunk exceeds the file".to_owned()));
        }

        if match_tag(bytes, offset, b"fmt ") {
            if chunk_size < 16 {
                return Err(Error::MalformedWav("fmt chunk too small".to_owned()));
            }
            audio_format = read_u16(bytes, chunk_data_offset).unwrap_or(0);
            channels = read_u16(bytes, chunk_data_offset + 2).unwrap_or(0);
            sample_rate = read_u32(bytes, chunk_data_offset + 4).unwrap_or(0);
            block_align = read_u16(bytes, chunk_data_offset + 12).unwrap_or(0);
            bits_per_sample = read_u16(bytes, chunk_data_offset + 14).unwrap_or(0);

            // WAVE_FORMAT_EXTENSIBLE wraps the real format in a sub-format
            // GUID; only the PCM and float sub-formats are accepted.
            if audio_format == 0xFFFE {
                if chunk_size < 40 {
                    return Err(Error::MalformedWav("extensible fmt chunk too small".to_owned()));
                }
                let cb_size = read_u16(bytes, chunk_data_offset + 16).unwrap_or(0);
                if cb_size < 22 {
                    return Err(Error::MalformedWav("extensible extra data too small".to_owned()));
                }
                let sub_format = read_u32(bytes, chunk_data_offset + 24).unwrap_or(0);
                audio_format = match sub_format {
                    0x0000_0001 => 1,
                    0x0000_0003 => 3,
                    _ => {
                        return Err(Error::MalformedWav("unsupported sub-format".to_owned()));
                    }
                };
            }

            has_fmt = true;
        } else if match_tag(bytes, offset, b"data") {
            data = Some(bytes[chunk_data_offset..chunk_data_offset + chunk_size].to_vec());
        }

        offset = chunk_data_offset + chunk_size;
        // Chunks are word-aligned.
        if chunk_size % 2 != 0 {
            offset += 1;
        }
    }

    let data = data.ok_or_else(|| Error::MalformedWav("missing data chunk".to_owned()))?;
    if !has_fmt {
        return Err(Error::MalformedWav("missing fmt chunk".to_owned()));
    }
    if channels == 0 || sample_rate == 0 {
        return Err(Error::MalformedWav("zero channels or sample rate".to_owned()));
    }

    let (sample_format, bytes_per_sample) = match (audio_format, bits_per_sample) {
        (1, 16) => (AUDIO_SAMPLE_FORMAT_PCM16, 2u32),
        (3, 32) => (AUDIO_SAMPLE_FORMAT_PCM32F, 4u32),
        _ => {
            return Err(Error::MalformedWav(format!(
                "unsupported format {audio_format} with {bits_per_sample} bits per sample"
            )));
        }
    };

    let bytes_per_frame = u32::from(channels) * bytes_per_sample;
    if block_align == 0 || u32::from(block_align) != bytes_per_frame {
        return Err(Error::MalformedWav("block align does not match the frame size".to_owned()));
    }

    if data.is_empty() {
        return Err(Error::Empty);
    }
    if data.len() % bytes_per_frame as usize != 0 {
        return Err(Error::MalformedWav("data is not a whole number of frames".to_owned()));
    }

    let frame_count = data.len() / bytes_per_frame as usize;
    if frame_count == 0 || frame_count > u32::MAX as usize {
        return Err(Error::MalformedWav("invalid frame count".to_owned()));
    }

    Ok(WavInfo {
        channels: u32::from(channels),
        sample_rate,
        sample_format,
        frame_count: frame_count as u32,
        data,
    })
}

struct OggInfo {
    channels: u32,
    sample_rate: u32,
    frame_count: u64,
}

fn parse_vorbis_id_packet(packet: &[u8]) -> Result<(u32, u32), Error> {
    if packet.len() < 30 || packet[0] != 0x01 || &packet[1..7] != b"vorbis" {
        return Err(Error::MalformedOgg("missing identification packet".to_owned()));
    }
    if read_u32(packet, 7) != Some(0) {
        return Err(Error::MalformedOgg("unsupported vorbis version".to_owned()));
    }
    let channels = u32::from(packet[11]);
    let sample_rate = read_u32(packet, 12).unwrap_or(0);
    if channels == 0 || sample_rate == 0 {
        return Err(Error::MalformedOgg("zero channels or sample rate".to_owned()));
    }
    Ok((channels, sample_rate))
}

/// Walks the Ogg pages of a single logical stream: the identification
/// packet provides channels and rate, the last granule position is the
/// total frame count.
fn parse_ogg_vorbis(bytes: &[u8]) -> Result<OggInfo, Error> {
    if bytes.len() < 27 {
        return Err(Error::MalformedOgg("file shorter than one page header".to_owned()));
    }

    let mut offset = 0usize;
    let mut got_id = false;
    let mut channels = 0u32;
    let mut sample_rate = 0u32;
    let mut packet: Vec<u8> = Vec::new();
    let mut last_granule = 0u64;
    let mut has_granule = false;
    let mut serial = 0u32;
    let mut serial_set = false;

    while offset + 27 <= bytes.len() {
        if !match_tag(bytes, offset, b"OggS") {
            return Err(Error::MalformedOgg("missing page capture pattern".to_owned()));
        }
        if bytes[offset + 4] != 0 {
            return Err(Error::MalformedOgg("unsupported page version".to_owned()));
        }
        let granule = read_u64(bytes, offset + 6)
            .ok_or_else(|| Error::MalformedOgg("truncated page header".to_owned()))?;
        let page_serial = read_u32(bytes, offset + 14)
            .ok_or_else(|| Error::MalformedOgg("truncated page header".to_owned()))?;
        if !serial_set {
            serial = page_serial;
            serial_set = true;
        } else if page_serial != serial {
            return Err(Error::MalformedOgg("multiplexed streams are not supported".to_owned()));
        }

        let segment_count = bytes[offset + 26] as usize;
        let segment_offset = offset + 27;
        let data_offset = segment_offset + segment_count;
        if data_offset > bytes.len() {
            return Err(Error::MalformedOgg("truncated segment table".to_owned()));
        }
        let total_segment_size: usize =
            bytes[segment_offset..data_offset].iter().map(|size| *size as usize).sum();
        if data_offset + total_segment_size > bytes.len() {
            return Err(Error::MalformedOgg("page data exceeds the file".to_owned()));
        }

        if granule != u64::MAX {
            last_granule = granule;
            has_granule = true;
        }

        if !got_id {
            let mut data_position = data_offset;
            for segment in 0..segment_count {
                let segment_size = bytes[segment_offset + segment] as usize;
                if segment_size > 0 {
                    packet.extend_from_slice(&bytes[data_position..data_position + segment_size]);
                }
                data_position += segment_size;
                if segment_size < 255 {
                    let (id_channels, id_rate) = parse_vorbis_id_packet(&packet)?;
                    channels = id_channels;
                    sample_rate = id_rate;
                    got_id = true;
                    packet.clear();
                    break;
                }
            }
        }

        offset = data_offset + total_segment_size;
    }

    if !got_id || !has_granule {
        return Err(Error::MalformedOgg("incomplete stream".to_owned()));
    }
    if last_granule == 0 || last_granule > u64::from(u32::MAX) {
        return Err(Error::MalformedOgg("invalid granule position".to_owned()));
    }

    Ok(OggInfo { channels, sample_rate, frame_count: last_granule })
}

/// Splits `data_size` bytes into chunks of at most `chunk_bytes`,
/// assigning payload-relative offsets after the chunk table.
fn chunk_by_bytes(data_size: u32, chunk_bytes: u32, table_entries: u32) -> Vec<AudioChunk> {
    let table_bytes = table_entries * AudioChunk::SIZE as u32;
    let mut chunks = Vec::with_capacity(table_entries as usize);
    let mut remaining = data_size;
    let mut running_offset = 0u32;
    while remaining > 0 {
        let take = remaining.min(chunk_bytes);
        chunks.push(AudioChunk { offset: table_bytes + running_offset, size: take });
        running_offset += take;
        remaining -= take;
    }
    chunks
}

fn build_audio_blob(
    data: &[u8],
    codec: u32,
    sample_format: u32,
    channels: u32,
    sample_rate: u32,
    frame_count: u32,
    frames_per_chunk: u32,
    chunks: &[AudioChunk],
) -> crate::Result<Vec<u8>> {
    if channels == 0 || sample_rate == 0 || frame_count == 0 {
        return Err(Error::Empty.into());
    }
    if frames_per_chunk == 0 || chunks.is_empty() || data.is_empty() {
        return Err(Error::Empty.into());
    }

    let chunk_table_bytes = chunks.len() as u32 * AudioChunk::SIZE as u32;
    let blob_data_size = chunk_table_bytes + data.len() as u32;

    let desc = AudioBlobDesc {
        codec,
        sample_format,
        channels,
        sample_rate,
        frame_count,
        chunk_count: chunks.len() as u32,
        frames_per_chunk,
        chunk_table_offset: 0,
        data_offset: chunk_table_bytes,
        data_size: data.len() as u32,
    };
    let header =
        BlobHeader::new(AssetType::Audio, 0, AudioBlobDesc::SIZE as u32, blob_data_size);

    let mut blob =
        Vec::with_capacity(BlobHeader::SIZE + AudioBlobDesc::SIZE + blob_data_size as usize);
    header.write(&mut blob)?;
    desc.write(&mut blob)?;
    for chunk in chunks {
        chunk.write(&mut blob)?;
    }
    blob.extend_from_slice(data);
    Ok(blob)
}

/// Cooks a `.wav` or `.ogg` source into a chunked audio blob.
pub fn cook_audio(source_path: &Path, source_bytes: &[u8]) -> crate::Result<CookedAudio> {
    let extension = extract_extension_from_path(source_path)?;

    let (codec, sample_format, channels, sample_rate, frame_count, data) =
        match extension.as_str() {
            "wav" => {
                let wav = parse_wav(source_bytes)?;
                (
                    AUDIO_CODEC_PCM,
                    wav.sample_format,
                    wav.channels,
                    wav.sample_rate,
                    wav.frame_count,
                    wav.data,
                )
            }
            "ogg" => {
                let ogg = parse_ogg_vorbis(source_bytes)?;
                (
                    AUDIO_CODEC_OGG_VORBIS,
                    AUDIO_SAMPLE_FORMAT_PCM16,
                    ogg.channels,
                    ogg.sample_rate,
                    ogg.frame_count as u32,
                    source_bytes.to_vec(),
                )
            }
            other => return Err(Error::UnsupportedFormat(other.to_owned()).into()),
        };

    let (frames_per_chunk, chunks) = if codec == AUDIO_CODEC_PCM {
        let bytes_per_frame = channels * audio_bytes_per_sample(sample_format);
        let frames_per_chunk = frame_count.min(PCM_FRAMES_PER_CHUNK);
        let chunk_count = frame_count.div_ceil(frames_per_chunk);
        let chunks =
            chunk_by_bytes(data.len() as u32, frames_per_chunk * bytes_per_frame, chunk_count);
        (frames_per_chunk, chunks)
    } else {
        let chunk_count = (data.len() as u32).div_ceil(OGG_CHUNK_BYTES).max(1);
        let frames_per_chunk = frame_count.div_ceil(chunk_count);
        if frames_per_chunk == 0 {
            return Err(Error::Empty.into());
        }
        let chunks = chunk_by_bytes(data.len() as u32, OGG_CHUNK_BYTES, chunk_count);
        (frames_per_chunk, chunks)
    };

    let blob = build_audio_blob(
        &data,
        codec,
        sample_format,
        channels,
        sample_rate,
        frame_count,
        frames_per_chunk,
        &chunks,
    )?;

    Ok(CookedAudio {
        blob,
        desc: AudioDesc {
            codec,
            channels,
            sample_rate,
            duration_seconds: (frame_count as f64 / f64::from(sample_rate)) as f32,
        },
    })
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use sable_shared::byteorder::WriteBytesExt;

    use super::*;

    /// Minimal PCM16 WAV with the given number of frames.
    fn wav_pcm16(channels: u16, sample_rate: u32, frames: u32) -> Vec<u8> {
        let bytes_per_frame = u32::from(channels) * 2;
        let data_size = frames * bytes_per_frame;
        let mut bytes = Vec::new();
        bytes.write_all(b"RIFF").unwrap();
        bytes.write_u32::<LittleEndian>(36 + data_size).unwrap();
        bytes.write_all(b"WAVE").unwrap();

        bytes.write_all(b"fmt ").unwrap();
        bytes.write_u32::<LittleEndian>(16).unwrap();
        bytes.write_u16::<LittleEndian>(1).unwrap(); // PCM
        bytes.write_u16::<LittleEndian>(channels).unwrap();
        bytes.write_u32::<LittleEndian>(sample_rate).unwrap();
        bytes.write_u32::<LittleEndian>(sample_rate * bytes_per_frame).unwrap();
        bytes.write_u16::<LittleEndian>(bytes_per_frame as u16).unwrap();
        bytes.write_u16::<LittleEndian>(16).unwrap();

        bytes.write_all(b"data").unwrap();
        bytes.write_u32::<LittleEndian>(data_size).unwrap();
        for i in 0..frames * u32::from(channels) {
            bytes.write_i16::<LittleEndian>((i % 128) as i16).unwrap();
        }
        bytes
    }

    #[test]
    fn wav_pcm16_cooks_with_chunk_table() {
        sable_test::setup_logger();

        // Given a stereo WAV of 5000 frames (just over one 4096-frame
        // chunk).
        let source = wav_pcm16(2, 44100, 5000);

        // When
        let cooked = cook_audio(Path::new("sound.wav"), &source).unwrap();

        // Then the blob carries two chunks that exactly cover the data.
        let mut cursor = Cursor::new(cooked.blob.as_slice());
        let header = BlobHeader::read(&mut cursor).unwrap();
        header.check().unwrap();
        assert_eq!(header.ty, AssetType::Audio.to_u8());

        let desc = AudioBlobDesc::read(&mut cursor).unwrap();
        assert_eq!(desc.codec, AUDIO_CODEC_PCM);
        assert_eq!(desc.sample_format, AUDIO_SAMPLE_FORMAT_PCM16);
        assert_eq!(desc.channels, 2);
        assert_eq!(desc.sample_rate, 44100);
        assert_eq!(desc.frame_count, 5000);
        assert_eq!(desc.chunk_count, 2);
        assert_eq!(desc.frames_per_chunk, 4096);
        assert_eq!(desc.data_size, 5000 * 4);
        assert_eq!(desc.chunk_table_offset, 0);
        assert_eq!(desc.data_offset, 2 * AudioChunk::SIZE as u32);

        let first = AudioChunk::read(&mut cursor).unwrap();
        let second = AudioChunk::read(&mut cursor).unwrap();
        assert_eq!(first.offset, desc.data_offset);
        assert_eq!(first.size, 4096 * 4);
        assert_eq!(second.offset, first.offset + first.size);
        assert_eq!(second.size, (5000 - 4096) * 4);
        assert_eq!(first.size + second.size, desc.data_size);

        assert_eq!(
            header.data_size,
            desc.data_size + desc.chunk_count * AudioChunk::SIZE as u32
        );

        // Summary desc.
        assert_eq!(cooked.desc.codec, AUDIO_CODEC_PCM);
        assert_eq!(cooked.desc.channels, 2);
        assert!((cooked.desc.duration_seconds - 5000.0 / 44100.0).abs() < 1e-6);
    }

    #[test]
    fn short_wav_uses_one_chunk() {
        let source = wav_pcm16(1, 8000, 100);
        let cooked = cook_audio(Path::new("blip.wav"), &source).unwrap();
        let mut cursor = Cursor::new(cooked.blob.as_slice());
        BlobHeader::read(&mut cursor).unwrap();
        let desc = AudioBlobDesc::read(&mut cursor).unwrap();
        assert_eq!(desc.chunk_count, 1);
        assert_eq!(desc.frames_per_chunk, 100);
    }

    #[test]
    fn wav_with_wrong_block_align_fails() {
        let mut source = wav_pcm16(2, 44100, 16);
        // block align lives at byte 32 of the file.
        source[32] = 7;
        assert!(cook_audio(Path::new("bad.wav"), &source).is_err());
    }

    #[test]
    fn wav_with_partial_frame_fails() {
        let mut source = wav_pcm16(2, 44100, 16);
        // Shrink the data chunk size by one byte and drop the last byte.
        let data_size_at = source.len() - 16 * 4 - 4;
        let old = LittleEndian::read_u32(&source[data_size_at..data_size_at + 4]);
        LittleEndian::write_u32(&mut source[data_size_at..data_size_at + 4], old - 1);
        source.pop();
        assert!(cook_audio(Path::new("bad.wav"), &source).is_err());
    }

    #[test]
    fn truncated_wav_fails() {
        assert!(cook_audio(Path::new("nothing.wav"), b"RIFF").is_err());
    }

    #[test]
    fn unknown_extension_fails() {
        assert!(cook_audio(Path::new("music.mp3"), &[0u8; 64]).is_err());
    }

    /// Builds a tiny single-stream Ogg Vorbis skeleton: one page with the
    /// identification packet, one page carrying the final granule.
    fn ogg_vorbis(channels: u8, sample_rate: u32, frames: u64) -> Vec<u8> {
        let mut id_packet = Vec::new();
        id_packet.push(0x01);
        id_packet.write_all(b"vorbis").unwrap();
        id_packet.write_u32::<LittleEndian>(0).unwrap(); // version
        id_packet.push(channels);
        id_packet.write_u32::<LittleEndian>(sample_rate).unwrap();
        id_packet.write_u32::<LittleEndian>(0).unwrap(); // bitrate max
        id_packet.write_u32::<LittleEndian>(0).unwrap(); // bitrate nominal
        id_packet.write_u32::<LittleEndian>(0).unwrap(); // bitrate min
        id_packet.push(0xB8); // blocksizes
        id_packet.push(0x01); // framing

        let page = |granule: u64, payload: &[u8]| -> Vec<u8> {
            let mut bytes = Vec::new();
            bytes.write_all(b"OggS").unwrap();
            bytes.push(0); // version
            bytes.push(0); // header type
            bytes.write_u64::<LittleEndian>(granule).unwrap();
            bytes.write_u32::<LittleEndian>(0x1234).unwrap(); // serial
            bytes.write_u32::<LittleEndian>(0).unwrap(); // page sequence
            bytes.write_u32::<LittleEndian>(0).unwrap(); // checksum, unchecked
            bytes.push(1); // one segment
            bytes.push(payload.len() as u8);
            bytes.write_all(payload).unwrap();
            bytes
        };

        let mut stream = page(0, &id_packet);
        stream.extend(page(frames, &[0x05; 16]));
        stream
    }

    #[test]
    fn ogg_vorbis_cooks_whole_stream() {
        let source = ogg_vorbis(2, 48000, 12345);
        let cooked = cook_audio(Path::new("music.ogg"), &source).unwrap();

        let mut cursor = Cursor::new(cooked.blob.as_slice());
        BlobHeader::read(&mut cursor).unwrap();
        let desc = AudioBlobDesc::read(&mut cursor).unwrap();
        assert_eq!(desc.codec, AUDIO_CODEC_OGG_VORBIS);
        assert_eq!(desc.channels, 2);
        assert_eq!(desc.sample_rate, 48000);
        assert_eq!(desc.frame_count, 12345);
        assert_eq!(desc.chunk_count, 1);
        // The compressed stream is stored as-is.
        assert_eq!(desc.data_size as usize, source.len());
    }

    #[test]
    fn ogg_with_mixed_serials_fails() {
        let mut source = ogg_vorbis(2, 48000, 100);
        // Second page starts after the first; its serial lives at +14.
        let second_page = source.windows(4).skip(4).position(|w| w == b"OggS").unwrap() + 4;
        source[second_page + 14] ^= 0xFF;
        assert!(cook_audio(Path::new("bad.ogg"), &source).is_err());
    }

    #[test]
    fn ogg_without_granule_fails() {
        let source = ogg_vorbis(2, 48000, 0);
        assert!(cook_audio(Path::new("empty.ogg"), &source).is_err());
    }
}
