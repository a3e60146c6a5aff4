//! PCM layout conversion for outbound audio
//!
//! The transcription service expects 16kHz mono 16-bit PCM. Conversion is
//! integer-ratio decimation plus stereo mixdown.

/// Downsample interleaved samples by decimation (keeps every Nth frame)
///
/// Returns the input unchanged when the ratio is not an integer > 1.
pub fn downsample(samples: &[i16], channels: u16, from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || to_rate == 0 {
        return samples.to_vec();
    }

    let ratio = (from_rate / to_rate) as usize;
    if ratio <= 1 {
        return samples.to_vec(); // Can't upsample
    }

    let channels = channels.max(1) as usize;
    samples
        .chunks_exact(channels)
        .step_by(ratio)
        .flatten()
        .copied()
        .collect()
}

/// Mix interleaved stereo down to mono by averaging left and right
pub fn stereo_to_mono(samples: &[i16]) -> Vec<i16> {
    samples
        .chunks_exact(2)
        .map(|pair| ((pair[0] as i32 + pair[1] as i32) / 2) as i16)
        .collect()
}

/// Convert to the target rate and channel count
pub fn to_target_format(
    samples: &[i16],
    channels: u16,
    sample_rate: u32,
    target_rate: u32,
    target_channels: u16,
) -> Vec<i16> {
    let mut out = downsample(samples, channels, sample_rate, target_rate);

    if channels == 2 && target_channels == 1 {
        out = stereo_to_mono(&out);
    }

    out
}
