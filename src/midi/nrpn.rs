//! Reassembly of four-message NRPN sequences.
//!
//! The Qu sends every parameter change as CC 99 (parameter MSB), CC 98
//! (parameter LSB), CC 6 (value MSB) and CC 38 (value LSB). Other hardware
//! sends the same four in different orders, so a channel only waits for all
//! four to arrive.

use std::time::{Duration, Instant};

use log::debug;

use super::{ParamSource, ParameterChange, CHANNELS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NrpnController {
    ParamMsb,
    ParamLsb,
    ValueMsb,
    ValueLsb,
}

impl NrpnController {
    pub fn from_cc(controller: u8) -> Option<Self> {
        match controller {
            99 => Some(NrpnController::ParamMsb),
            98 => Some(NrpnController::ParamLsb),
            6 => Some(NrpnController::ValueMsb),
            38 => Some(NrpnController::ValueLsb),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyPhase {
    Empty,
    /// One parameter byte seen, no value bytes.
    ParamPartial,
    /// Both parameter bytes seen, no value bytes.
    ParamComplete,
    /// At least one value byte seen, sequence not finished.
    ValuePartial,
    Complete,
}

/// Fragments collected so far on one channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NrpnAssemblyState {
    param_msb: Option<u8>,
    param_lsb: Option<u8>,
    value_msb: Option<u8>,
    value_lsb: Option<u8>,
    last_update: Option<Instant>,
}

impl NrpnAssemblyState {
    pub fn phase(&self) -> AssemblyPhase {
        let params = self.param_msb.is_some() as u8 + self.param_lsb.is_some() as u8;
        let values = self.value_msb.is_some() as u8 + self.value_lsb.is_some() as u8;
        match (params, values) {
            (0, 0) => AssemblyPhase::Empty,
            (2, 2) => AssemblyPhase::Complete,
            (2, 0) => AssemblyPhase::ParamComplete,
            (_, 0) => AssemblyPhase::ParamPartial,
            _ => AssemblyPhase::ValuePartial,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.phase() == AssemblyPhase::Empty
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    fn is_stale(&self, now: Instant, timeout: Duration) -> bool {
        match self.last_update {
            Some(at) => now.saturating_duration_since(at) > timeout,
            None => false,
        }
    }

    fn set(&mut self, controller: NrpnController, value: u8, now: Instant) {
        let slot = match controller {
            NrpnController::ParamMsb => &mut self.param_msb,
            NrpnController::ParamLsb => &mut self.param_lsb,
            NrpnController::ValueMsb => &mut self.value_msb,
            NrpnController::ValueLsb => &mut self.value_lsb,
        };
        *slot = Some(value & 0x7F);
        self.last_update = Some(now);
    }

    fn take_complete(&mut self, channel: u8) -> Option<ParameterChange> {
        let (pm, pl, vm, vl) = (self.param_msb?, self.param_lsb?, self.value_msb?, self.value_lsb?);
        self.clear();
        Some(ParameterChange {
            channel,
            parameter: (pm as u16) << 7 | pl as u16,
            value: (vm as u16) << 7 | vl as u16,
            source: ParamSource::Nrpn,
        })
    }
}

/// Stateless driver for [`NrpnAssemblyState`]; the caller owns the state.
#[derive(Debug, Clone)]
pub struct NrpnAssembler {
    timeout: Duration,
}

impl NrpnAssembler {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Apply one fragment. Returns the finished change once all four
    /// fragments are present; the state is then empty again.
    pub fn feed(
        &self,
        state: &mut NrpnAssemblyState,
        channel: u8,
        controller: NrpnController,
        value: u8,
        now: Instant,
    ) -> Option<ParameterChange> {
        if state.is_stale(now, self.timeout) {
            debug!(target: "midi", "ch{}: discarding stale NRPN fragments {:?}", channel, state);
            state.clear();
        }
        state.set(controller, value, now);
        state.take_complete(channel)
    }

    /// Reset every channel whose partial sequence has timed out.
    pub fn expire(&self, states: &mut [NrpnAssemblyState; CHANNELS], now: Instant) -> usize {
        let mut expired = 0;
        for (channel, state) in states.iter_mut().enumerate() {
            if !state.is_empty() && state.is_stale(now, self.timeout) {
                debug!(target: "midi", "ch{}: NRPN assembly timed out in {:?}", channel, state.phase());
                state.clear();
                expired += 1;
            }
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use NrpnController::*;

    const TIMEOUT: Duration = Duration::from_millis(80);

    fn permutations(items: &[NrpnController]) -> Vec<Vec<NrpnController>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }
        let mut out = Vec::new();
        for i in 0..items.len() {
            let mut rest = items.to_vec();
            let head = rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, head);
                out.push(tail);
            }
        }
        out
    }

    fn byte_for(c: NrpnController) -> u8 {
        match c {
            ParamMsb => 0x21,
            ParamLsb => 0x17,
            ValueMsb => 0x55,
            ValueLsb => 0x03,
        }
    }

    #[test]
    fn test_any_order_emits_exactly_once() {
        let orders = permutations(&[ParamMsb, ParamLsb, ValueMsb, ValueLsb]);
        assert_eq!(orders.len(), 24);
        let asm = NrpnAssembler::new(TIMEOUT);
        for order in orders {
            let mut state = NrpnAssemblyState::default();
            let t = Instant::now();
            let emitted: Vec<_> = order
                .iter()
                .filter_map(|&c| asm.feed(&mut state, 4, c, byte_for(c), t))
                .collect();
            assert_eq!(
                emitted,
                vec![ParameterChange {
                    channel: 4,
                    parameter: 0x21 << 7 | 0x17,
                    value: 0x55 << 7 | 0x03,
                    source: ParamSource::Nrpn,
                }],
                "order {:?}",
                order
            );
            assert!(state.is_empty());
        }
    }

    #[test]
    fn test_phases() {
        let asm = NrpnAssembler::new(TIMEOUT);
        let t = Instant::now();
        let mut state = NrpnAssemblyState::default();
        assert_eq!(state.phase(), AssemblyPhase::Empty);
        asm.feed(&mut state, 0, ParamMsb, 1, t);
        assert_eq!(state.phase(), AssemblyPhase::ParamPartial);
        asm.feed(&mut state, 0, ParamLsb, 2, t);
        assert_eq!(state.phase(), AssemblyPhase::ParamComplete);
        asm.feed(&mut state, 0, ValueLsb, 3, t);
        assert_eq!(state.phase(), AssemblyPhase::ValuePartial);
        assert!(asm.feed(&mut state, 0, ValueMsb, 4, t).is_some());
        assert_eq!(state.phase(), AssemblyPhase::Empty);
    }

    #[test]
    fn test_interrupted_sequence_expires() {
        let asm = NrpnAssembler::new(TIMEOUT);
        let mut states: [NrpnAssemblyState; CHANNELS] = Default::default();
        let t = Instant::now();
        assert!(asm.feed(&mut states[1], 1, ParamMsb, 1, t).is_none());
        assert!(asm.feed(&mut states[1], 1, ParamLsb, 2, t).is_none());
        assert!(asm.feed(&mut states[1], 1, ValueMsb, 3, t).is_none());

        assert_eq!(asm.expire(&mut states, t + TIMEOUT / 2), 0);
        assert_eq!(states[1].phase(), AssemblyPhase::ValuePartial);

        assert_eq!(asm.expire(&mut states, t + TIMEOUT * 2), 1);
        assert!(states.iter().all(NrpnAssemblyState::is_empty));
    }

    #[test]
    fn test_stale_fragments_are_not_stitched() {
        let asm = NrpnAssembler::new(TIMEOUT);
        let mut state = NrpnAssemblyState::default();
        let t = Instant::now();
        asm.feed(&mut state, 0, ParamMsb, 1, t);
        asm.feed(&mut state, 0, ParamLsb, 2, t);
        asm.feed(&mut state, 0, ValueMsb, 3, t);

        // The last fragment arrives too late: old data is dropped first.
        let late = t + TIMEOUT * 3;
        assert!(asm.feed(&mut state, 0, ValueLsb, 4, late).is_none());
        assert_eq!(state.phase(), AssemblyPhase::ValuePartial);
    }

    #[test]
    fn test_repeated_fragment_overwrites_and_refreshes() {
        let asm = NrpnAssembler::new(TIMEOUT);
        let mut state = NrpnAssemblyState::default();
        let t = Instant::now();
        asm.feed(&mut state, 0, ParamMsb, 1, t);
        asm.feed(&mut state, 0, ParamLsb, 2, t);
        asm.feed(&mut state, 0, ValueMsb, 3, t);
        // Correction 60ms later keeps the sequence alive past the original deadline.
        let t2 = t + Duration::from_millis(60);
        asm.feed(&mut state, 0, ValueMsb, 9, t2);
        let pc = asm
            .feed(&mut state, 0, ValueLsb, 0, t + Duration::from_millis(120))
            .expect("sequence completes");
        assert_eq!(pc.parameter, 1 << 7 | 2);
        assert_eq!(pc.value, 9 << 7);
    }

    #[test]
    fn test_channels_are_independent() {
        let asm = NrpnAssembler::new(TIMEOUT);
        let mut states: [NrpnAssemblyState; CHANNELS] = Default::default();
        let t = Instant::now();
        asm.feed(&mut states[0], 0, ParamMsb, 1, t);
        asm.feed(&mut states[0], 0, ParamLsb, 1, t);
        asm.feed(&mut states[9], 9, ParamMsb, 2, t);
        asm.feed(&mut states[9], 9, ParamLsb, 2, t);
        asm.feed(&mut states[0], 0, ValueMsb, 1, t);
        assert!(asm.feed(&mut states[9], 9, ValueMsb, 2, t).is_none());
        let a = asm.feed(&mut states[0], 0, ValueLsb, 1, t).unwrap();
        let b = asm.feed(&mut states[9], 9, ValueLsb, 2, t).unwrap();
        assert_eq!((a.channel, a.parameter), (0, 1 << 7 | 1));
        assert_eq!((b.channel, b.parameter), (9, 2 << 7 | 2));
    }
}
