use std::collections::VecDeque;

/// Go-Back-N send window over 1-based chunk indices.
///
/// Iterating yields the sequence numbers that may be sent now; each yielded
/// number is recorded as in flight.
pub struct Window {
    size: usize,
    total: u32,
    base: u32,
    next_send: u32,
    in_flight: VecDeque<u16>,
}

impl Window {
    pub fn new(size: u16, total: u16) -> Self {
        let size = usize::from(size.max(1));
        Self {
            size,
            total: u32::from(total),
            base: 1,
            next_send: 1,
            in_flight: VecDeque::with_capacity(size),
        }
    }

    /// Lowest unacknowledged chunk index.
    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn next_send(&self) -> u32 {
        self.next_send
    }

    pub fn in_flight(&self) -> &VecDeque<u16> {
        &self.in_flight
    }

    pub fn is_complete(&self) -> bool {
        self.base > self.total
    }

    /// Slide past `ack` if it acknowledges the oldest outstanding packet.
    pub fn update(&mut self, ack: u16) -> bool {
        if self.in_flight.front() != Some(&ack) {
            return false;
        }
        self.in_flight.pop_front();
        self.base = u32::from(ack) + 1;
        true
    }

    /// Forget everything in flight and resume sending from `base`.
    pub fn rewind(&mut self) {
        self.in_flight.clear();
        self.next_send = self.base;
    }
}

impl Iterator for Window {
    type Item = u16;

    fn next(&mut self) -> Option<Self::Item> {
        if self.in_flight.len() >= self.size || self.next_send > self.total {
            return None;
        }
        // total fits in u16, so does every index up to it
        let seq = self.next_send as u16;
        self.in_flight.push_back(seq);
        self.next_send += 1;
        Some(seq)
    }
}
