//! Two-component Gaussian mixture models for noise and speech, per band.
//!
//! Each band carries a noise model and a speech model. A frame's features are
//! scored against both, the log-likelihood ratios are tested locally (per
//! band) and globally (weighted sum), and the model that did *not* win is
//! left alone while the other adapts toward the observation. The noise model
//! additionally drifts toward the tracked noise floor.
//!
//! All tables are calibration data and are kept exactly as tuned.

use super::fixed::{div_w32_w16, norm_w32, Q4, Q7};
use super::filterbank::MIN_ENERGY;
use super::noise_floor::NoiseFloor;
use super::CHANNEL_COUNT;

const GAUSSIAN_COUNT: usize = 2;
const TABLE_SIZE: usize = CHANNEL_COUNT * GAUSSIAN_COUNT;

/// Per-band weights of the log-likelihood ratio sum.
const SPECTRUM_WEIGHT: [i32; CHANNEL_COUNT] = [6, 8, 10, 12, 14, 16];
/// Learning rates, Q15.
const NOISE_UPDATE_CONST: i32 = 655;
const SPEECH_UPDATE_CONST: i32 = 6554;
/// Noise-floor correction rate, Q8.
const BACK_ETA: i32 = 154;
/// Minimum separation of the global speech and noise means, Q5.
const MINIMUM_DIFFERENCE: [i16; CHANNEL_COUNT] = [544, 544, 576, 576, 576, 576];
/// Ceiling of the global speech mean, Q7.
const MAXIMUM_SPEECH: [i16; CHANNEL_COUNT] = [11392, 11392, 11520, 11520, 11520, 11520];
/// Floor of each speech Gaussian's mean, Q7.
const MINIMUM_MEAN: [i16; GAUSSIAN_COUNT] = [640, 768];
/// Ceiling of the global noise mean, Q7.
const MAXIMUM_NOISE: [i16; CHANNEL_COUNT] = [9216, 9088, 8960, 8832, 8704, 8576];

// Tables are indexed `gaussian * CHANNEL_COUNT + channel`.

/// Mixture weights, Q7.
const NOISE_DATA_WEIGHTS: [i16; TABLE_SIZE] = [34, 62, 72, 66, 53, 25, 94, 66, 56, 62, 75, 103];
const SPEECH_DATA_WEIGHTS: [i16; TABLE_SIZE] = [48, 82, 45, 87, 50, 47, 80, 46, 83, 41, 78, 81];

/// Initial means, Q7.
const NOISE_DATA_MEANS: [i16; TABLE_SIZE] = [
    6738, 4892, 7065, 6715, 6771, 3369, 7646, 3863, 7820, 7266, 5020, 4362,
];
const SPEECH_DATA_MEANS: [i16; TABLE_SIZE] = [
    8306, 10085, 10078, 11823, 11843, 6309, 9473, 9571, 10879, 7581, 8180, 7483,
];

/// Initial standard deviations, Q7.
const NOISE_DATA_STDS: [i16; TABLE_SIZE] = [
    378, 1064, 493, 582, 688, 593, 474, 697, 475, 688, 421, 455,
];
const SPEECH_DATA_STDS: [i16; TABLE_SIZE] = [
    555, 505, 567, 524, 585, 1231, 509, 828, 492, 1540, 1079, 850,
];

/// Smallest standard deviation a Gaussian may adapt to, Q7.
const MIN_STD: i16 = 384;

/// Exponents below `-COMP_VAR` (Q10) are treated as zero probability.
const COMP_VAR: i32 = 22005;
/// `log2(e)` in Q12.
const LOG2_EXP: i32 = 5909;

const fn q7_table(raw: [i16; TABLE_SIZE]) -> [Q7; TABLE_SIZE] {
    let mut out = [Q7::from_raw(0); TABLE_SIZE];
    let mut i = 0;
    while i < TABLE_SIZE {
        out[i] = Q7::from_raw(raw[i]);
        i += 1;
    }
    out
}

/// Gaussian density of `input` under (`mean`, `std`).
///
/// Returns the probability in Q20 and the normalized distance
/// `(input - mean) / std^2` in Q11, which drives the model updates.
pub(crate) fn gaussian_probability(input: Q4, mean: Q7, std: Q7) -> (i32, i16) {
    // 1 / std in Q10, rounded.
    let inv_std = div_w32_w16(131_072 + (i32::from(std.raw()) >> 1), std.raw()) as i16;
    let tmp16 = inv_std >> 2; // Q8
    let inv_std2 = ((i32::from(tmp16) * i32::from(tmp16)) >> 2) as i16; // Q14

    let distance = (input.convert::<7>() - mean).raw(); // Q7
    let delta = ((i32::from(inv_std2) * i32::from(distance)) >> 10) as i16; // Q11

    // (input - mean)^2 / (2 * std^2) in Q10.
    let exponent = (i32::from(delta) * i32::from(distance)) >> 9;

    let mut exp_value = 0i32;
    if exponent < COMP_VAR {
        // 2^(-exponent * log2(e)) as a 10-bit mantissa and a right shift.
        let mut tmp16 = ((LOG2_EXP * exponent) >> 12) as i16;
        tmp16 = tmp16.wrapping_neg();
        let mantissa = 0x0400 | (tmp16 & 0x03FF);
        tmp16 ^= -1;
        tmp16 >>= 10;
        tmp16 += 1;
        exp_value = i32::from(mantissa) >> tmp16.clamp(0, 31);
    }

    (i32::from(inv_std) * exp_value, delta)
}

/// Update both Gaussians of `channel` by `offset` and return their weighted sum.
fn weighted_average(
    data: &mut [Q7; TABLE_SIZE],
    channel: usize,
    offset: i16,
    weights: &[i16; TABLE_SIZE],
) -> i32 {
    let mut average = 0i32;
    for k in 0..GAUSSIAN_COUNT {
        let g = channel + k * CHANNEL_COUNT;
        data[g] = data[g] + Q7::from_raw(offset);
        average += i32::from(data[g].raw()) * i32::from(weights[g]);
    }
    average
}

/// Decision thresholds for one aggressiveness level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Thresholds {
    pub local: i16,
    pub global: i16,
}

/// The adaptive noise and speech models.
#[derive(Debug, Clone)]
pub(crate) struct GmmModel {
    noise_means: [Q7; TABLE_SIZE],
    speech_means: [Q7; TABLE_SIZE],
    noise_stds: [Q7; TABLE_SIZE],
    speech_stds: [Q7; TABLE_SIZE],
    noise_floor: NoiseFloor,
    /// Frames that passed the energy gate.
    frame_counter: u32,
}

impl Default for GmmModel {
    fn default() -> Self {
        Self {
            noise_means: q7_table(NOISE_DATA_MEANS),
            speech_means: q7_table(SPEECH_DATA_MEANS),
            noise_stds: q7_table(NOISE_DATA_STDS),
            speech_stds: q7_table(SPEECH_DATA_STDS),
            noise_floor: NoiseFloor::default(),
            frame_counter: 0,
        }
    }
}

impl GmmModel {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn frame_counter(&self) -> u32 {
        self.frame_counter
    }

    /// Classify one frame and adapt the models. Hysteresis is not applied here.
    pub fn classify(
        &mut self,
        features: &[Q4; CHANNEL_COUNT],
        total_energy: i16,
        thresholds: Thresholds,
    ) -> bool {
        if total_energy <= MIN_ENERGY {
            return false;
        }

        let mut delta_n = [0i16; TABLE_SIZE];
        let mut delta_s = [0i16; TABLE_SIZE];
        // Per-Gaussian posterior weights, Q14.
        let mut ngprvec = [0i16; TABLE_SIZE];
        let mut sgprvec = [0i16; TABLE_SIZE];

        let mut speech = false;
        let mut sum_log_likelihood_ratios = 0i32;

        for channel in 0..CHANNEL_COUNT {
            let mut noise_probability = [0i32; GAUSSIAN_COUNT];
            let mut speech_probability = [0i32; GAUSSIAN_COUNT];
            let mut h0_test = 0i32;
            let mut h1_test = 0i32;

            for k in 0..GAUSSIAN_COUNT {
                let g = channel + k * CHANNEL_COUNT;

                let (p, d) =
                    gaussian_probability(features[channel], self.noise_means[g], self.noise_stds[g]);
                delta_n[g] = d;
                noise_probability[k] = i32::from(NOISE_DATA_WEIGHTS[g]) * p; // Q27
                h0_test = h0_test.wrapping_add(noise_probability[k]);

                let (p, d) =
                    gaussian_probability(features[channel], self.speech_means[g], self.speech_stds[g]);
                delta_s[g] = d;
                speech_probability[k] = i32::from(SPEECH_DATA_WEIGHTS[g]) * p; // Q27
                h1_test = h1_test.wrapping_add(speech_probability[k]);
            }

            // log2 of the likelihood ratio, as a difference of normalization shifts.
            let shifts_h0 = if h0_test == 0 { 31 } else { norm_w32(h0_test) };
            let shifts_h1 = if h1_test == 0 { 31 } else { norm_w32(h1_test) };
            let log_likelihood_ratio = shifts_h0 - shifts_h1;
            sum_log_likelihood_ratios += i32::from(log_likelihood_ratio) * SPECTRUM_WEIGHT[channel];
            if i32::from(log_likelihood_ratio) * 4 > i32::from(thresholds.local) {
                speech = true;
            }

            let h0 = (h0_test >> 12) as i16; // Q15
            if h0 > 0 {
                let first = (((noise_probability[0] as u32) & 0xFFFF_F000) << 2) as i32; // Q29
                ngprvec[channel] = div_w32_w16(first, h0) as i16;
                ngprvec[channel + CHANNEL_COUNT] = 16384i16.wrapping_sub(ngprvec[channel]);
            } else {
                ngprvec[channel] = 16384;
            }

            let h1 = (h1_test >> 12) as i16; // Q15
            if h1 > 0 {
                let first = (((speech_probability[0] as u32) & 0xFFFF_F000) << 2) as i32; // Q29
                sgprvec[channel] = div_w32_w16(first, h1) as i16;
                sgprvec[channel + CHANNEL_COUNT] = 16384i16.wrapping_sub(sgprvec[channel]);
            }
        }

        speech |= sum_log_likelihood_ratios >= i32::from(thresholds.global);

        let mut max_speech: i16 = 12800;
        for channel in 0..CHANNEL_COUNT {
            let feature = features[channel];
            let feature_minimum = self
                .noise_floor
                .update(feature, channel, self.frame_counter);

            let noise_global_mean =
                weighted_average(&mut self.noise_means, channel, 0, &NOISE_DATA_WEIGHTS);
            let noise_global_q8 = (noise_global_mean >> 6) as i16;

            for k in 0..GAUSSIAN_COUNT {
                let g = channel + k * CHANNEL_COUNT;
                let nmk = self.noise_means[g].raw();
                let smk = self.speech_means[g].raw();

                // Noise mean: learn only from non-speech, always pull toward the floor.
                let mut nmk2 = nmk;
                if !speech {
                    let delt = ((i32::from(ngprvec[g]) * i32::from(delta_n[g])) >> 11) as i16;
                    nmk2 = nmk.wrapping_add(((i32::from(delt) * NOISE_UPDATE_CONST) >> 22) as i16);
                }
                let ndelt = ((i32::from(feature_minimum.raw()) << 4) - i32::from(noise_global_q8)) as i16;
                let mut nmk3 = nmk2.wrapping_add(((i32::from(ndelt) * BACK_ETA) >> 9) as i16);

                let lower = (k as i16 + 5) << 7;
                let upper = (72 + k as i16 - channel as i16) << 7;
                nmk3 = nmk3.max(lower).min(upper);
                self.noise_means[g] = Q7::from_raw(nmk3);

                if speech {
                    self.adapt_speech(g, k, feature, smk, delta_s[g], sgprvec[g], max_speech);
                } else {
                    self.adapt_noise_std(g, feature, nmk, delta_n[g], ngprvec[g]);
                }
            }

            // Keep the models apart.
            let mut noise_global_mean =
                weighted_average(&mut self.noise_means, channel, 0, &NOISE_DATA_WEIGHTS);
            let mut speech_global_mean =
                weighted_average(&mut self.speech_means, channel, 0, &SPEECH_DATA_WEIGHTS);

            let diff = ((speech_global_mean >> 9) as i16).wrapping_sub((noise_global_mean >> 9) as i16);
            if diff < MINIMUM_DIFFERENCE[channel] {
                let gap = MINIMUM_DIFFERENCE[channel].wrapping_sub(diff);
                let speech_shift = ((13 * i32::from(gap)) >> 2) as i16;
                let noise_shift = ((3 * i32::from(gap)) >> 2) as i16;
                speech_global_mean =
                    weighted_average(&mut self.speech_means, channel, speech_shift, &SPEECH_DATA_WEIGHTS);
                noise_global_mean = weighted_average(
                    &mut self.noise_means,
                    channel,
                    noise_shift.wrapping_neg(),
                    &NOISE_DATA_WEIGHTS,
                );
            }

            // Cap both global means.
            max_speech = MAXIMUM_SPEECH[channel];
            let speech_q7 = (speech_global_mean >> 7) as i16;
            if speech_q7 > max_speech {
                let excess = Q7::from_raw(speech_q7 - max_speech);
                for k in 0..GAUSSIAN_COUNT {
                    let g = channel + k * CHANNEL_COUNT;
                    self.speech_means[g] = self.speech_means[g] - excess;
                }
            }

            let noise_q7 = (noise_global_mean >> 7) as i16;
            if noise_q7 > MAXIMUM_NOISE[channel] {
                let excess = Q7::from_raw(noise_q7 - MAXIMUM_NOISE[channel]);
                for k in 0..GAUSSIAN_COUNT {
                    let g = channel + k * CHANNEL_COUNT;
                    self.noise_means[g] = self.noise_means[g] - excess;
                }
            }
        }

        self.frame_counter = self.frame_counter.wrapping_add(1);
        speech
    }

    #[allow(clippy::too_many_arguments)]
    fn adapt_speech(
        &mut self,
        g: usize,
        k: usize,
        feature: Q4,
        smk: i16,
        delta: i16,
        posterior: i16,
        max_speech: i16,
    ) {
        let delt = ((i32::from(posterior) * i32::from(delta)) >> 11) as i16;
        let step = ((i32::from(delt) * SPEECH_UPDATE_CONST) >> 21) as i16;
        let mut smk2 = (i32::from(smk) + ((i32::from(step) + 1) >> 1)) as i16;
        let max_mean = max_speech + 640;
        smk2 = smk2.max(MINIMUM_MEAN[k]).min(max_mean);
        self.speech_means[g] = Q7::from_raw(smk2);

        // Standard deviation, from the pre-update mean.
        let centered = (feature - Q7::from_raw(smk).convert_rounded::<4>()).raw(); // Q4
        let tmp1 = (i32::from(delta) * i32::from(centered)) >> 3;
        let tmp2 = tmp1 - 4096;
        let weight = posterior >> 2;
        let scaled = i32::from(weight).wrapping_mul(tmp2) >> 4; // Q20

        let mut ssk = self.speech_stds[g].raw();
        let divisor = ssk.wrapping_mul(10);
        let correction = if scaled > 0 {
            div_w32_w16(scaled, divisor) as i16
        } else {
            (div_w32_w16(scaled.wrapping_neg(), divisor) as i16).wrapping_neg()
        };
        ssk = ssk.wrapping_add(correction.wrapping_add(128) >> 8);
        self.speech_stds[g] = Q7::from_raw(ssk.max(MIN_STD));
    }

    fn adapt_noise_std(&mut self, g: usize, feature: Q4, nmk: i16, delta: i16, posterior: i16) {
        let centered = (feature - Q7::from_raw(nmk).convert::<4>()).raw(); // Q4
        let tmp1 = ((i32::from(delta) * i32::from(centered)) >> 3) - 4096;
        let weight = ((i32::from(posterior) + 2) >> 2) as i16;
        let scaled = i32::from(weight).wrapping_mul(tmp1) >> 14;

        let mut nsk = self.noise_stds[g].raw();
        let correction = if scaled > 0 {
            div_w32_w16(scaled, nsk) as i16
        } else {
            (div_w32_w16(scaled.wrapping_neg(), nsk) as i16).wrapping_neg()
        };
        nsk = nsk.wrapping_add(correction.wrapping_add(32) >> 6);
        self.noise_stds[g] = Q7::from_raw(nsk.max(MIN_STD));
    }
}
