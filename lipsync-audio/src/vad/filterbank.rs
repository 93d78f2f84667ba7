//! Six-band split of an 8 kHz frame and per-band log energies.
//!
//! ```text
//!            ┌─ 2000–4000 ─┬─ 3000–4000 → band 5
//!            │             └─ 2000–3000 → band 4
//! 0–4000 ────┤
//!            └─ 0–2000 ────┬─ 1000–2000 → band 3
//!                          └─ 0–1000 ───┬─ 500–1000 → band 2
//!                                       └─ 0–500 ───┬─ 250–500 → band 1
//!                                                   └─ 0–250 → high-pass 80 Hz → band 0
//! ```
//!
//! Each split is a pair of first-order all-pass sections on the even and odd
//! samples, so every level halves the sample rate.

use super::fixed::{energy, norm_u32, Q4};
use super::{CHANNEL_COUNT, FRAME_LENGTH};

/// High-pass filter coefficients, Q14.
const HP_ZERO_COEFS: [i32; 3] = [6631, -13262, 6631];
const HP_POLE_COEFS: [i32; 3] = [16384, -7756, 5620];

/// All-pass coefficients of the upper and lower split branches, Q15.
const UPPER_ALL_PASS_COEF: i32 = 20972;
const LOWER_ALL_PASS_COEF: i32 = 5571;

/// Per-band offsets added to the log energies, Q4.
const OFFSET_VECTOR: [i16; CHANNEL_COUNT] = [368, 368, 272, 176, 176, 176];

/// Total energy at or below this is treated as silence.
pub(crate) const MIN_ENERGY: i16 = 10;

/// `160 * log10(2)` in Q9.
const LOG_CONST: i32 = 24660;
/// 14 in Q10.
const LOG_ENERGY_INT_PART: i16 = 14336;

/// Log energies of one frame plus a coarse total-energy gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Features {
    pub bands: [Q4; CHANNEL_COUNT],
    pub total_energy: i16,
}

/// Persistent filter state across frames.
#[derive(Debug, Clone, Default)]
pub(crate) struct FilterBank {
    upper_state: [i16; 5],
    lower_state: [i16; 5],
    hp_state: [i16; 4],
}

impl FilterBank {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn features(&mut self, frame: &[i16]) -> Features {
        debug_assert_eq!(frame.len(), FRAME_LENGTH);

        let mut bands = [Q4::default(); CHANNEL_COUNT];
        let mut total_energy = 0i16;

        let half = frame.len() / 2;
        let quarter = half / 2;
        let mut hp_a = [0i16; FRAME_LENGTH / 2];
        let mut lp_a = [0i16; FRAME_LENGTH / 2];
        let mut hp_b = [0i16; FRAME_LENGTH / 4];
        let mut lp_b = [0i16; FRAME_LENGTH / 4];

        // 0–4000 Hz → 0–2000 / 2000–4000
        self.split(0, frame, &mut hp_a[..half], &mut lp_a[..half]);

        // 2000–4000 Hz → 2000–3000 / 3000–4000
        self.split(1, &hp_a[..half], &mut hp_b[..quarter], &mut lp_b[..quarter]);
        bands[5] = log_of_energy(&hp_b[..quarter], OFFSET_VECTOR[5], &mut total_energy);
        bands[4] = log_of_energy(&lp_b[..quarter], OFFSET_VECTOR[4], &mut total_energy);

        // 0–2000 Hz → 0–1000 / 1000–2000
        self.split(2, &lp_a[..half], &mut hp_b[..quarter], &mut lp_b[..quarter]);
        bands[3] = log_of_energy(&hp_b[..quarter], OFFSET_VECTOR[3], &mut total_energy);

        // 0–1000 Hz → 0–500 / 500–1000
        let eighth = quarter / 2;
        self.split(3, &lp_b[..quarter], &mut hp_a[..eighth], &mut lp_a[..eighth]);
        bands[2] = log_of_energy(&hp_a[..eighth], OFFSET_VECTOR[2], &mut total_energy);

        // 0–500 Hz → 0–250 / 250–500
        let sixteenth = eighth / 2;
        self.split(4, &lp_a[..eighth], &mut hp_b[..sixteenth], &mut lp_b[..sixteenth]);
        bands[1] = log_of_energy(&hp_b[..sixteenth], OFFSET_VECTOR[1], &mut total_energy);

        // 80–250 Hz
        high_pass(&lp_b[..sixteenth], &mut self.hp_state, &mut hp_a[..sixteenth]);
        bands[0] = log_of_energy(&hp_a[..sixteenth], OFFSET_VECTOR[0], &mut total_energy);

        Features {
            bands,
            total_energy,
        }
    }

    fn split(&mut self, stage: usize, input: &[i16], hp_out: &mut [i16], lp_out: &mut [i16]) {
        split_filter(
            input,
            &mut self.upper_state[stage],
            &mut self.lower_state[stage],
            hp_out,
            lp_out,
        );
    }
}

/// Second-order high-pass, cutting below roughly 80 Hz at a 500 Hz rate.
fn high_pass(input: &[i16], state: &mut [i16; 4], output: &mut [i16]) {
    for (out, &x) in output.iter_mut().zip(input) {
        let mut acc = (HP_ZERO_COEFS[0] * i32::from(x))
            .wrapping_add(HP_ZERO_COEFS[1] * i32::from(state[0]))
            .wrapping_add(HP_ZERO_COEFS[2] * i32::from(state[1]));
        state[1] = state[0];
        state[0] = x;

        acc = acc
            .wrapping_sub(HP_POLE_COEFS[1] * i32::from(state[2]))
            .wrapping_sub(HP_POLE_COEFS[2] * i32::from(state[3]));
        state[3] = state[2];
        state[2] = (acc >> 14) as i16;
        *out = state[2];
    }
}

/// First-order all-pass over every other input sample. Output is Q(-1).
fn all_pass<'a>(
    input: impl Iterator<Item = &'a i16>,
    coefficient: i32,
    state: &mut i16,
    output: &mut [i16],
) {
    let mut state32 = i32::from(*state) << 16; // Q15
    for (out, &x) in output.iter_mut().zip(input) {
        let acc = state32.wrapping_add(coefficient * i32::from(x));
        let y = (acc >> 16) as i16;
        *out = y;
        state32 = ((i32::from(x) << 14).wrapping_sub(coefficient * i32::from(y))).wrapping_mul(2);
    }
    *state = (state32 >> 16) as i16;
}

/// Quadrature-mirror split into a high band and a low band, each at half rate.
fn split_filter(
    input: &[i16],
    upper_state: &mut i16,
    lower_state: &mut i16,
    hp_out: &mut [i16],
    lp_out: &mut [i16],
) {
    let half = input.len() / 2;
    all_pass(input.iter().step_by(2), UPPER_ALL_PASS_COEF, upper_state, &mut hp_out[..half]);
    all_pass(input.iter().skip(1).step_by(2), LOWER_ALL_PASS_COEF, lower_state, &mut lp_out[..half]);

    for (hp, lp) in hp_out[..half].iter_mut().zip(&mut lp_out[..half]) {
        let upper = *hp;
        *hp = hp.wrapping_sub(*lp);
        *lp = lp.wrapping_add(upper);
    }
}

/// Log energy of `data` in Q4 with `offset` added.
///
/// Also bumps `total_energy` while it is still at or below [`MIN_ENERGY`].
fn log_of_energy(data: &[i16], offset: i16, total_energy: &mut i16) -> Q4 {
    let (raw_energy, mut tot_rshifts) = energy(data);
    let mut energy = raw_energy as u32;
    if energy == 0 {
        return Q4::from_raw(offset);
    }

    // Bring the energy into 15 bits, tracking the shift.
    let normalizing_rshifts = 17 - i32::from(norm_u32(energy));
    tot_rshifts += normalizing_rshifts;
    if normalizing_rshifts < 0 {
        energy <<= -normalizing_rshifts;
    } else {
        energy >>= normalizing_rshifts;
    }

    // Integer part 14 plus a linear approximation of the fraction, Q10.
    let log2_energy = LOG_ENERGY_INT_PART + ((energy & 0x0000_3FFF) >> 4) as i16;

    let mut log_energy =
        (((LOG_CONST * i32::from(log2_energy)) >> 19) + ((tot_rshifts * LOG_CONST) >> 9)) as i16;
    if log_energy < 0 {
        log_energy = 0;
    }
    log_energy = log_energy.wrapping_add(offset);

    if *total_energy <= MIN_ENERGY {
        if tot_rshifts >= 0 {
            *total_energy += MIN_ENERGY + 1;
        } else {
            *total_energy = total_energy.wrapping_add((energy >> -tot_rshifts) as i16);
        }
    }

    Q4::from_raw(log_energy)
}
