//! Emission cursor handed in by the measurement environment

use hwsampler_core::Ticks;

/// Sink for post-mortem `(ticks, value)` pairs
pub trait Cursor {
    fn write(&mut self, ticks: Ticks, value: u64);
}

/// Cursor collecting into memory
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VecCursor {
    pub points: Vec<(Ticks, u64)>,
}

impl VecCursor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Cursor for VecCursor {
    fn write(&mut self, ticks: Ticks, value: u64) {
        self.points.push((ticks, value));
    }
}

impl<C: Cursor + ?Sized> Cursor for &mut C {
    fn write(&mut self, ticks: Ticks, value: u64) {
        (**self).write(ticks, value);
    }
}
