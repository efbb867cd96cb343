//! Controllable load bank.
//!
//! Loads are indexed by ascending priority: index 0 is the first to go.
//! Two bitmaps are tracked, `connected` (actual breaker state) and
//! `desired` (operator switch intent). The bank upholds
//! `connected ⊆ desired`: it may drop a desired load but never connects one
//! the operator has switched off.

/// Upper bound on the number of loads (one bit per load in a `u32`).
pub const MAX_LOADS: usize = 32;

/// How switch positions are folded into the bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchPolicy {
    /// Loads follow their switches in both directions.
    FreeToggle,
    /// Switches can only disconnect; re-enabling a switch marks the load
    /// desired but leaves reconnection to the controller.
    ShedOnly,
}

/// Bitmaps emitted to the relay/LED collaborator each iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadOutputs {
    /// Loads currently connected.
    pub connected: u32,
    /// Loads desired but not connected (shed indicator).
    pub shed_indicator: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadBank {
    count: usize,
    mask: u32,
    connected: u32,
    desired: u32,
}

impl LoadBank {
    /// A bank of `count` loads, all off. `count` is clamped to `1..=MAX_LOADS`.
    #[must_use]
    pub fn new(count: usize) -> Self {
        let count = count.clamp(1, MAX_LOADS);
        let mask = if count == MAX_LOADS {
            u32::MAX
        } else {
            (1_u32 << count) - 1
        };
        Self {
            count,
            mask,
            connected: 0,
            desired: 0,
        }
    }

    /// A bank with every load desired and connected.
    #[must_use]
    pub fn all_connected(count: usize) -> Self {
        let mut bank = Self::new(count);
        bank.desired = bank.mask;
        bank.connected = bank.mask;
        bank
    }

    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    #[must_use]
    pub const fn connected_bits(&self) -> u32 {
        self.connected
    }

    #[must_use]
    pub const fn desired_bits(&self) -> u32 {
        self.desired
    }

    #[must_use]
    pub const fn is_connected(&self, index: usize) -> bool {
        index < self.count && self.connected & (1 << index) != 0
    }

    #[must_use]
    pub const fn is_desired(&self, index: usize) -> bool {
        index < self.count && self.desired & (1 << index) != 0
    }

    /// Fold the switch bitmap in under `policy`. Bits beyond `count` are ignored.
    pub fn apply_switches(&mut self, switches: u32, policy: SwitchPolicy) {
        let switches = switches & self.mask;
        self.desired = switches;
        self.connected = match policy {
            SwitchPolicy::FreeToggle => switches,
            SwitchPolicy::ShedOnly => self.connected & switches,
        };
        debug_assert_eq!(self.connected & !self.desired, 0);
    }

    /// Disconnect the lowest-index connected load.
    pub fn shed(&mut self) -> Option<usize> {
        if self.connected == 0 {
            return None;
        }
        let index = self.connected.trailing_zeros() as usize;
        self.connected &= !(1 << index);
        Some(index)
    }

    /// Reconnect the highest-index load that is desired but disconnected.
    pub fn reconnect(&mut self) -> Option<usize> {
        let eligible = self.eligible_bits();
        if eligible == 0 {
            return None;
        }
        let index = (u32::BITS - 1 - eligible.leading_zeros()) as usize;
        self.connected |= 1 << index;
        debug_assert_eq!(self.connected & !self.desired, 0);
        Some(index)
    }

    /// No desired load is waiting to be reconnected.
    #[must_use]
    pub const fn all_reconnected(&self) -> bool {
        self.eligible_bits() == 0
    }

    #[must_use]
    pub const fn outputs(&self) -> LoadOutputs {
        LoadOutputs {
            connected: self.connected,
            shed_indicator: self.eligible_bits(),
        }
    }

    const fn eligible_bits(&self) -> u32 {
        self.desired & !self.connected & self.mask
    }
}
