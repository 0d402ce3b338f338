// fqpack
// Copyright (c) 2019-2026 The fqpack Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Adaptive frequency tables over small fixed alphabets, and the single
//! shared update-cadence routine both the encoder and decoder call so their
//! arithmetic can never drift apart.
//!
//! [`Distribution`] is generic over the alphabet size `N` via a const
//! generic rather than a `Vec`, since every alphabet this crate models
//! (nucleotide symbols, quality deltas, id byte classes, aux tag/type pairs)
//! is fixed at compile time — this mirrors how the teacher favours
//! fixed-size arrays over heap allocation wherever a size is known ahead of
//! time (e.g. `symphonia_core::audio`'s channel-count-bounded buffers).

use crate::ac::{Decoder, Encoder, TOTAL_MAX};

/// An adaptive frequency table over the alphabet `[0, N)`.
///
/// `encode`/`decode` drive the shared [`Encoder`]/[`Decoder`] using the
/// symbol's current cumulative frequency range, then record the
/// observation. Every `update_rate` observations (scaled into a delay
/// countdown, see [`Distribution::rescale`]) the table is rebuilt from the
/// accumulated counts.
#[derive(Clone)]
pub struct Distribution<const N: usize> {
    count: [u16; N],
    freq: [u16; N],
    update_delay: u16,
    update_rate: u8,
}

impl<const N: usize> Distribution<N> {
    /// A freshly initialized distribution: uniform frequencies (remainder
    /// assigned to the lowest-index symbols) and the default update rate.
    pub fn new() -> Self {
        assert!(N > 0 && N <= TOTAL_MAX as usize, "alphabet size out of range");
        let mut d = Distribution {
            count: [0; N],
            freq: [0; N],
            update_delay: 0,
            update_rate: 4,
        };
        d.set_uniform();
        d.update_delay = Self::schedule_delay(d.update_rate);
        d
    }

    fn set_uniform(&mut self) {
        let base = TOTAL_MAX / N as u32;
        let mut remainder = TOTAL_MAX - base * N as u32;
        for f in self.freq.iter_mut() {
            let mut v = base;
            if remainder > 0 {
                v += 1;
                remainder -= 1;
            }
            *f = v as u16;
        }
    }

    /// Explicitly installs a frequency table (e.g. to seed a distribution
    /// with a known-skewed prior). `cs` must sum to [`TOTAL_MAX`] and every
    /// entry must be nonzero.
    pub fn set(&mut self, cs: &[u16; N]) {
        debug_assert!(cs.iter().map(|&c| c as u32).sum::<u32>() == TOTAL_MAX);
        debug_assert!(cs.iter().all(|&c| c > 0));
        self.freq = *cs;
        self.count = [0; N];
        self.update_delay = Self::schedule_delay(self.update_rate);
    }

    /// Sets the rate at which this distribution is rebuilt from observed
    /// counts. Larger rates mean larger delays between rebuilds (slower
    /// adaptation, more stable estimates); see [`Distribution::schedule_delay`].
    pub fn set_update_rate(&mut self, rate: u8) {
        self.update_rate = rate;
    }

    fn cum_range(&self, symbol: usize) -> (u32, u32) {
        let lo: u32 = self.freq[..symbol].iter().map(|&f| f as u32).sum();
        let hi = lo + self.freq[symbol] as u32;
        (lo, hi)
    }

    fn find_symbol(&self, target: u32) -> (usize, u32, u32) {
        let mut cum = 0u32;
        for (i, &f) in self.freq.iter().enumerate() {
            let next = cum + f as u32;
            if target < next {
                return (i, cum, next);
            }
            cum = next;
        }
        unreachable!("cumulative frequencies must sum to TOTAL_MAX")
    }

    fn observe(&mut self, symbol: usize) {
        self.count[symbol] = self.count[symbol].saturating_add(1);
        self.update_delay -= 1;
        if self.update_delay == 0 {
            self.rescale();
            self.update_delay = Self::schedule_delay(self.update_rate);
        }
    }

    /// The single routine both `encode` and `decode` call to rebuild
    /// `freq[]` from `count[]`. Any divergence here between two
    /// implementations desynchronizes encoder and decoder irrecoverably, so
    /// this is the one place the arithmetic is written down.
    fn rescale(&mut self) {
        const DECAY_THRESHOLD: u32 = TOTAL_MAX / 2;

        let total: u32 = self.count.iter().map(|&c| c as u32).sum();
        if total > DECAY_THRESHOLD {
            for c in self.count.iter_mut() {
                let had_any = *c > 0;
                *c /= 2;
                if had_any && *c == 0 {
                    *c = 1;
                }
            }
        }

        // Every symbol gets a floor of 1 count of weight, even if never
        // observed, so every symbol keeps a nonzero frequency.
        let weights: [u32; N] = std::array::from_fn(|i| self.count[i] as u32 + 1);
        let weight_sum: u32 = weights.iter().sum();

        let mut freq = [0u16; N];
        let mut assigned: u32 = 0;
        for i in 0..N {
            let f = ((weights[i] * TOTAL_MAX) / weight_sum).max(1);
            freq[i] = f as u16;
            assigned += f;
        }

        let mut leftover = TOTAL_MAX.saturating_sub(assigned);
        if leftover > 0 {
            let mut order: Vec<usize> = (0..N).collect();
            order.sort_by(|&a, &b| self.count[b].cmp(&self.count[a]).then(a.cmp(&b)));
            let mut idx = 0;
            while leftover > 0 {
                freq[order[idx % order.len()]] += 1;
                leftover -= 1;
                idx += 1;
            }
        }

        self.freq = freq;
    }

    /// Larger `update_rate` means a larger delay (slower adaptation). The
    /// schedule is exponential in the rate, scaled from a floor of 16
    /// observations between rebuilds.
    fn schedule_delay(update_rate: u8) -> u16 {
        let shift = update_rate.min(12) as u32;
        (16u32 << shift).min(u16::MAX as u32) as u16
    }

    pub fn encode(&mut self, ac: &mut Encoder, symbol: usize) {
        let (lo, hi) = self.cum_range(symbol);
        ac.encode_renorm(lo, hi, TOTAL_MAX);
        self.observe(symbol);
    }

    pub fn decode(&mut self, ac: &mut Decoder) -> usize {
        let target = ac.decode_target(TOTAL_MAX);
        let (symbol, lo, hi) = self.find_symbol(target);
        ac.decode_renorm(lo, hi, TOTAL_MAX);
        self.observe(symbol);
        symbol
    }
}

impl<const N: usize> Default for Distribution<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// An array of `M` [`Distribution<N>`]s selected by a caller-computed
/// context value `y`. The caller pays the cost of computing `y`; the
/// conditional distribution itself is just storage plus a shared update
/// rate broadcast to every sub-distribution.
#[derive(Clone)]
pub struct CondDistribution<const N: usize, const M: usize> {
    xs: Vec<Distribution<N>>,
}

impl<const N: usize, const M: usize> CondDistribution<N, M> {
    pub fn new() -> Self {
        CondDistribution { xs: (0..M).map(|_| Distribution::new()).collect() }
    }

    pub fn set_update_rate(&mut self, rate: u8) {
        for d in self.xs.iter_mut() {
            d.set_update_rate(rate);
        }
    }

    pub fn set_one(&mut self, y: usize, cs: &[u16; N]) {
        self.xs[y].set(cs);
    }

    pub fn encode(&mut self, ac: &mut Encoder, y: usize, symbol: usize) {
        self.xs[y].encode(ac, symbol);
    }

    pub fn decode(&mut self, ac: &mut Decoder, y: usize) -> usize {
        self.xs[y].decode(ac)
    }
}

impl<const N: usize, const M: usize> Default for CondDistribution<N, M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_init_sums_to_total() {
        let d: Distribution<7> = Distribution::new();
        let sum: u32 = (0..7).map(|i| d.cum_range(i).1 - d.cum_range(i).0).sum();
        assert_eq!(sum, TOTAL_MAX);
        for i in 0..7 {
            assert!(d.cum_range(i).1 > d.cum_range(i).0);
        }
    }

    #[test]
    fn round_trips_skewed_alphabet() {
        let symbols: Vec<usize> = (0..4000)
            .map(|i| match i % 13 {
                0..=8 => 0,
                9..=10 => 1,
                11 => 2,
                _ => 3,
            })
            .collect();

        let mut enc_dist: Distribution<4> = Distribution::new();
        let mut enc = Encoder::new();
        for &s in &symbols {
            enc_dist.encode(&mut enc, s);
        }
        enc.finish();
        let mut bytes = Vec::new();
        enc.drain_to(&mut bytes).unwrap();

        let mut dec_dist: Distribution<4> = Distribution::new();
        let mut dec = Decoder::new();
        dec.reset(bytes.clone());
        dec.start();
        let decoded: Vec<usize> = (0..symbols.len()).map(|_| dec_dist.decode(&mut dec)).collect();

        assert_eq!(symbols, decoded);

        // A skewed alphabet should compress well below 2 bits/symbol.
        assert!(bytes.len() < symbols.len());
    }

    #[test]
    fn cond_distribution_keeps_contexts_independent() {
        let mut enc = Encoder::new();
        let mut cd: CondDistribution<3, 2> = CondDistribution::new();
        let seq = [(0usize, 0usize), (0, 1), (1, 2), (1, 0), (0, 2)].repeat(50);
        for &(y, s) in &seq {
            cd.encode(&mut enc, y, s);
        }
        enc.finish();
        let mut bytes = Vec::new();
        enc.drain_to(&mut bytes).unwrap();

        let mut dec = Decoder::new();
        dec.reset(bytes);
        dec.start();
        let mut dec_cd: CondDistribution<3, 2> = CondDistribution::new();
        let decoded: Vec<(usize, usize)> =
            seq.iter().map(|&(y, _)| (y, dec_cd.decode(&mut dec, y))).collect();

        assert_eq!(seq, decoded);
    }
}
