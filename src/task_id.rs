use core::fmt;
use core::ops::{BitOr, BitOrAssign};

/// The maximum number of tasks one list can be asked to track. Task
/// identities are bit positions in a fixed-width mask, so the width bounds
/// how many tasks a single list may hold between resets.
pub const MAX_TASKS_PER_LIST: usize = 256;

const WORDS: usize = MAX_TASKS_PER_LIST / 64;

/// Identifies a task within a list, and doubles as a set of identities
/// when used as a dependency requirement. Identities are assigned
/// sequentially starting from 1; sequence number 0 is reserved for the
/// empty mask, meaning "no dependency" or "not a task". Masks merge with
/// `|`, and a requirement `a` is met by a completion mask `b` when
/// `b.contains(a)`.
///
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskId {
    bits: [u64; WORDS],
}

impl TaskId {
    /// The empty mask: identifies no task and depends on nothing.
    pub fn none() -> Self {
        Self::default()
    }

    /// Return the identity for the task with the given sequence number.
    /// Sequence number 0 yields the empty mask. Panics if the sequence
    /// number exceeds the mask width, which means the owning list was
    /// given more tasks than it can track; that is a configuration error,
    /// not a recoverable condition, because the width is fixed.
    ///
    pub fn new(sequence: usize) -> Self {
        if sequence > MAX_TASKS_PER_LIST {
            panic!(
                "task sequence number {} exceeds the list capacity of {}",
                sequence, MAX_TASKS_PER_LIST
            );
        }
        let mut bits = [0; WORDS];

        if sequence > 0 {
            bits[(sequence - 1) / 64] |= 1 << ((sequence - 1) % 64);
        }
        Self { bits }
    }

    /// True if every identity set in `requirement` is also set in this
    /// mask. A completion mask satisfies a dependency requirement exactly
    /// when this holds; the empty requirement is satisfied by any mask.
    ///
    pub fn contains(self, requirement: TaskId) -> bool {
        self.bits
            .iter()
            .zip(&requirement.bits)
            .all(|(b, r)| b & r == *r)
    }

    /// True if no identity is set.
    pub fn is_none(self) -> bool {
        self.bits.iter().all(|b| *b == 0)
    }

    fn is_set(self, sequence: usize) -> bool {
        self.bits[(sequence - 1) / 64] & (1 << ((sequence - 1) % 64)) != 0
    }
}

impl BitOr for TaskId {
    type Output = TaskId;

    fn bitor(mut self, other: TaskId) -> TaskId {
        self |= other;
        self
    }
}

impl BitOrAssign for TaskId {
    fn bitor_assign(&mut self, other: TaskId) {
        for (b, o) in self.bits.iter_mut().zip(&other.bits) {
            *b |= o
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        let mut sep = "";
        write!(f, "[")?;

        for n in 1..=MAX_TASKS_PER_LIST {
            if self.is_set(n) {
                write!(f, "{}{}", sep, n)?;
                sep = " ";
            }
        }
        write!(f, "]")
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        fmt::Display::fmt(self, f)
    }
}

// ============================================================================
#[cfg(test)]
mod test {

    use super::{TaskId, MAX_TASKS_PER_LIST};

    #[test]
    fn sequential_identities_are_distinct() {
        for n in 1..=MAX_TASKS_PER_LIST {
            assert_ne!(TaskId::new(n), TaskId::none());
            assert_ne!(TaskId::new(n), TaskId::new(n % MAX_TASKS_PER_LIST + 1));
        }
    }

    #[test]
    fn zero_sequence_number_is_the_empty_mask() {
        assert_eq!(TaskId::new(0), TaskId::none());
        assert!(TaskId::new(0).is_none());
    }

    #[test]
    fn masks_merge_commutatively() {
        let a = TaskId::new(1);
        let b = TaskId::new(64);
        let c = TaskId::new(65);
        assert_eq!(a | b | c, c | a | b);
        assert_eq!((a | b) | c, a | (b | c));
    }

    #[test]
    fn containment_is_a_subset_test() {
        let completed = TaskId::new(1) | TaskId::new(3) | TaskId::new(200);
        assert!(completed.contains(TaskId::none()));
        assert!(completed.contains(TaskId::new(1)));
        assert!(completed.contains(TaskId::new(1) | TaskId::new(200)));
        assert!(!completed.contains(TaskId::new(2)));
        assert!(!completed.contains(TaskId::new(1) | TaskId::new(2)));
        assert!(TaskId::none().contains(TaskId::none()));
    }

    #[test]
    fn displays_set_sequence_numbers() {
        let mask = TaskId::new(2) | TaskId::new(5) | TaskId::new(66);
        assert_eq!(mask.to_string(), "[2 5 66]");
        assert_eq!(TaskId::none().to_string(), "[]");
    }

    #[test]
    #[should_panic(expected = "exceeds the list capacity")]
    fn sequence_number_past_the_mask_width_panics() {
        TaskId::new(MAX_TASKS_PER_LIST + 1);
    }
}
