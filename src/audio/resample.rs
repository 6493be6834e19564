use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{Fft, FixedSync, Resampler};

/// Resample f32 audio from 48kHz to 16kHz (ratio 1:3).
pub fn resample_48k_to_16k(input: &[f32]) -> anyhow::Result<Vec<f32>> {
    let nbr_frames = input.len();
    if nbr_frames == 0 {
        return Ok(Vec::new());
    }
    let channels = 1;

    let mut resampler = Fft::<f32>::new(48000, 16000, nbr_frames, 1, channels, FixedSync::Input)
        .map_err(|e| anyhow::anyhow!("failed to create resampler: {e:?}"))?;

    let output_len = resampler.process_all_needed_output_len(nbr_frames);
    let mut outdata = vec![0.0f32; output_len];

    let input_adapter = InterleavedSlice::new(input, channels, nbr_frames)
        .map_err(|e| anyhow::anyhow!("failed to create input adapter: {e:?}"))?;
    let mut output_adapter = InterleavedSlice::new_mut(&mut outdata, channels, output_len)
        .map_err(|e| anyhow::anyhow!("failed to create output adapter: {e:?}"))?;

    let (_nbr_in, nbr_out) = resampler
        .process_all_into_buffer(&input_adapter, &mut output_adapter, nbr_frames, None)
        .map_err(|e| anyhow::anyhow!("resample failed: {e:?}"))?;

    outdata.truncate(nbr_out);
    Ok(outdata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RECOGNIZER_RATE, RECORD_RATE};

    #[test]
    fn empty_input() {
        assert!(resample_48k_to_16k(&[]).unwrap().is_empty());
    }

    #[test]
    fn one_second_becomes_a_third_as_many_samples() {
        let input = vec![0.0f32; RECORD_RATE as usize];
        let out = resample_48k_to_16k(&input).unwrap();
        let expected = RECOGNIZER_RATE as usize;
        assert!(out.len().abs_diff(expected) <= 200, "got {}", out.len());
    }
}
