//! Per-session sequence numbers

use rand::Rng;

pub const SEQ_MIN: u8 = 0x20;
pub const SEQ_MAX: u8 = 0x7F;

/// Sequence counter in `[SEQ_MIN, SEQ_MAX]`
///
/// Advanced only after a confirmed exchange; wraps to `SEQ_MIN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceCounter {
    value: u8,
    step: u8,
}

impl SequenceCounter {
    /// Contiguous range, random start (Epson)
    pub fn contiguous() -> Self {
        let value = rand::thread_rng().gen_range(SEQ_MIN..=SEQ_MAX);
        Self { value, step: 1 }
    }

    /// Even numbers only, random start (Hasar keeps the low bit for direction)
    pub fn even() -> Self {
        let value = rand::thread_rng().gen_range(SEQ_MIN..=SEQ_MAX) & !1;
        Self { value, step: 2 }
    }

    /// Fixed start, for deterministic exchanges
    pub fn starting_at(value: u8, step: u8) -> Self {
        let value = value.clamp(SEQ_MIN, SEQ_MAX);
        let value = if step == 2 { value & !1 } else { value };
        Self {
            value,
            step: step.max(1),
        }
    }

    pub fn current(&self) -> u8 {
        self.value
    }

    pub fn step(&self) -> u8 {
        self.step
    }

    pub fn advance(&mut self) {
        let next = u16::from(self.value) + u16::from(self.step);
        self.value = if next > u16::from(SEQ_MAX) {
            SEQ_MIN
        } else {
            next as u8
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_start_in_range() {
        for _ in 0..200 {
            let c = SequenceCounter::contiguous();
            assert!((SEQ_MIN..=SEQ_MAX).contains(&c.current()));
            let e = SequenceCounter::even();
            assert!((SEQ_MIN..=SEQ_MAX).contains(&e.current()));
            assert_eq!(e.current() % 2, 0);
        }
    }

    #[test]
    fn test_contiguous_wrap() {
        let mut c = SequenceCounter::starting_at(SEQ_MAX, 1);
        c.advance();
        assert_eq!(c.current(), SEQ_MIN);
    }

    #[test]
    fn test_even_wrap() {
        let mut c = SequenceCounter::starting_at(0x7E, 2);
        c.advance();
        assert_eq!(c.current(), SEQ_MIN);

        let mut c = SequenceCounter::starting_at(0x21, 2);
        assert_eq!(c.current(), 0x20);
        c.advance();
        assert_eq!(c.current(), 0x22);
    }

    #[test]
    fn test_never_leaves_range() {
        let mut c = SequenceCounter::starting_at(SEQ_MIN, 1);
        for _ in 0..1000 {
            c.advance();
            assert!((SEQ_MIN..=SEQ_MAX).contains(&c.current()));
        }
    }
}
