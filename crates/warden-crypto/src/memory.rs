//! Pooled scratch buffers for secret material.
//!
//! A [`Rental`] is returned to its pool when dropped, so release happens on
//! every exit path including `?` and unwinding. Sensitive rentals are zeroized
//! (including spare capacity) before the buffer is handed to anyone else.

use std::io;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use zeroize::{Zeroize, Zeroizing};

use crate::base64url::{base64url_decode_into, decoded_len};
use crate::error::{rng_fill, CryptoError};

/// Buffers kept for reuse once released.
const DEFAULT_MAX_RETAINED: usize = 32;

/// Pool of reusable byte buffers.
///
/// Interior mutability via `parking_lot::Mutex`; rentals themselves are
/// single-owner and never shared.
pub struct SecurePool {
    free: Mutex<Vec<Vec<u8>>>,
    max_retained: usize,
    outstanding: AtomicUsize,
    wiped: AtomicUsize,
}

impl Default for SecurePool {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurePool {
    pub fn new() -> Self {
        Self::with_max_retained(DEFAULT_MAX_RETAINED)
    }

    pub fn with_max_retained(max_retained: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            max_retained,
            outstanding: AtomicUsize::new(0),
            wiped: AtomicUsize::new(0),
        }
    }

    /// Rent a zero-filled buffer of exactly `size` bytes.
    pub fn rent(&self, size: usize, sensitive: bool) -> Rental<'_> {
        let reused = {
            let mut free = self.free.lock();
            free.iter()
                .position(|b| b.capacity() >= size)
                .map(|i| free.swap_remove(i))
        };
        let mut buf = reused.unwrap_or_else(|| Vec::with_capacity(size));
        buf.resize(size, 0);
        self.outstanding.fetch_add(1, Ordering::Relaxed);
        Rental {
            pool: self,
            buf,
            sensitive,
        }
    }

    /// Rent a sensitive buffer filled from the OS RNG.
    pub fn rent_random(&self, size: usize) -> Result<Rental<'_>, CryptoError> {
        let mut rental = self.rent(size, true);
        rng_fill(&mut rental)?;
        Ok(rental)
    }

    /// Decode a base64url string straight into a sensitive rental.
    pub fn decode_base64url(&self, s: &str) -> Result<Rental<'_>, CryptoError> {
        let mut rental = self.rent(decoded_len(s.len())?, true);
        let written = base64url_decode_into(s, &mut rental)?.len();
        rental.truncate(written);
        Ok(rental)
    }

    /// Number of idle buffers currently held.
    pub fn retained(&self) -> usize {
        self.free.lock().len()
    }

    /// Rentals not yet returned.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Relaxed)
    }

    /// Sensitive buffers wiped so far, including allocations left behind
    /// when a rental grows.
    pub fn wiped(&self) -> usize {
        self.wiped.load(Ordering::Relaxed)
    }

    fn release(&self, mut buf: Vec<u8>, sensitive: bool) {
        if sensitive {
            buf.zeroize();
            self.wiped.fetch_add(1, Ordering::Relaxed);
        } else {
            buf.clear();
        }
        let mut free = self.free.lock();
        if free.len() < self.max_retained {
            free.push(buf);
        }
    }
}

/// A buffer on loan from a [`SecurePool`].
pub struct Rental<'a> {
    pool: &'a SecurePool,
    buf: Vec<u8>,
    sensitive: bool,
}

impl Rental<'_> {
    pub fn is_sensitive(&self) -> bool {
        self.sensitive
    }

    /// Shorten the visible length; dropped bytes stay covered by the wipe.
    pub fn truncate(&mut self, len: usize) {
        self.buf.truncate(len);
    }

    /// Set the visible length, zero-filling any new bytes.
    pub fn resize(&mut self, len: usize) {
        if len > self.buf.len() {
            self.reserve(len - self.buf.len());
        }
        self.buf.resize(len, 0);
    }

    pub fn extend_from_slice(&mut self, data: &[u8]) {
        self.reserve(data.len());
        self.buf.extend_from_slice(data);
    }

    /// Grow without letting the allocator move secret bytes behind our back:
    /// contents are copied into a fresh buffer and the old one goes back to
    /// the pool, wiped if sensitive.
    fn reserve(&mut self, additional: usize) {
        let needed = self.buf.len() + additional;
        if needed <= self.buf.capacity() {
            return;
        }
        let mut grown = Vec::with_capacity(needed.max(self.buf.capacity() * 2));
        grown.extend_from_slice(&self.buf);
        let old = std::mem::replace(&mut self.buf, grown);
        self.pool.release(old, self.sensitive);
    }

    /// Copy out into an owned buffer that wipes itself on drop.
    pub fn to_zeroizing(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.buf.clone())
    }
}

impl Deref for Rental<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl DerefMut for Rental<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

impl io::Write for Rental<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for Rental<'_> {
    fn drop(&mut self) {
        let buf = std::mem::take(&mut self.buf);
        self.pool.release(buf, self.sensitive);
        self.pool.outstanding.fetch_sub(1, Ordering::Relaxed);
    }
}
