//! `RxBuffer` — an owned rx frame, modelling the driver-issued buffer token
//! as a normal Rust value instead of a raw pointer plus a manual free call.
//! Exactly one of the forwarder's or sniffer's paths ever consumes a given
//! `RxBuffer`; every other path simply drops it, which is
//! where a real board-support `RadioDriver` would call its native free
//! function. Because `Vec<u8>` is not `Copy`, a double-free or
//! use-after-hand-off shows up as a borrow-checker error rather than a
//! runtime bug.

use log::trace;

pub struct RxBuffer(Vec<u8>);

impl RxBuffer {
    pub fn new(data: Vec<u8>) -> RxBuffer {
        RxBuffer(data)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

impl Drop for RxBuffer {
    fn drop(&mut self) {
        trace!("rx buffer released ({} bytes)", self.0.len());
    }
}
