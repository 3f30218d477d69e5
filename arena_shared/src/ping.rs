//! Round-trip and clock-offset estimation.
//!
//! Either side of a connection may probe the other: the prober sends
//! `ping{seq}` at a fixed cadence through [`PingTracker::poll`], the
//! responder answers with [`pong_for`], and [`PingTracker::on_pong`] turns
//! the echo into a [`PingSample`]. Times are seconds on the caller's clock.

use std::collections::VecDeque;

use crate::net::NetMsg;

/// Blend factor for the smoothed round trip.
pub const RTT_ALPHA: f64 = 0.125;
const MAX_PENDING: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PingSample {
    /// Round trip, seconds.
    pub rtt: f64,
    /// Local clock minus remote clock, seconds.
    pub offset: f64,
}

#[derive(Debug)]
pub struct PingTracker {
    interval: f64,
    next_seq: u32,
    last_sent: Option<f64>,
    /// `(seq, sent_at)`, oldest first.
    pending: VecDeque<(u32, f64)>,
    newest_acked: Option<u32>,
    smoothed_rtt: Option<f64>,
    offset: Option<f64>,
}

impl PingTracker {
    pub fn new(interval: f64) -> Self {
        Self {
            interval,
            next_seq: 0,
            last_sent: None,
            pending: VecDeque::new(),
            newest_acked: None,
            smoothed_rtt: None,
            offset: None,
        }
    }

    /// Returns a probe when one is due at `now`.
    pub fn poll(&mut self, now: f64) -> Option<NetMsg> {
        if self.last_sent.is_some_and(|t| now - t < self.interval) {
            return None;
        }
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.last_sent = Some(now);
        if self.pending.len() == MAX_PENDING {
            self.pending.pop_front();
        }
        self.pending.push_back((seq, now));
        Some(NetMsg::Ping { seq })
    }

    /// Consumes an echo. Echoes older than the newest answered probe, and
    /// echoes of probes never sent, yield nothing.
    pub fn on_pong(&mut self, seq: u32, remote_clock: f64, now: f64) -> Option<PingSample> {
        if self.newest_acked.is_some_and(|acked| seq <= acked) {
            return None;
        }
        let sent = self
            .pending
            .iter()
            .find_map(|&(s, at)| (s == seq).then_some(at))?;
        self.pending.retain(|&(s, _)| s > seq);
        self.newest_acked = Some(seq);

        let rtt = (now - sent).max(0.0);
        let offset = now - (remote_clock + rtt / 2.0);
        self.smoothed_rtt = Some(match self.smoothed_rtt {
            Some(prev) => smooth(prev, rtt, RTT_ALPHA),
            None => rtt,
        });
        self.offset = Some(offset);
        Some(PingSample { rtt, offset })
    }

    /// Smoothed round trip, seconds.
    pub fn rtt(&self) -> Option<f64> {
        self.smoothed_rtt
    }

    /// Latest local-minus-remote clock estimate, seconds.
    pub fn offset(&self) -> Option<f64> {
        self.offset
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Exponential moving average step.
pub fn smooth(prev: f64, sample: f64, alpha: f64) -> f64 {
    prev + alpha * (sample - prev)
}

pub fn pong_for(seq: u32, clock: f64) -> NetMsg {
    NetMsg::Pong { seq, clock }
}
