use serde::{Deserialize, Serialize};

/// Opaque handle of a front-end declaration bound to a stack slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeclId(pub u32);

/// Symbolic model of the machine stack: a depth plus slot bindings.
/// Slot 0 is the bottom; offsets reported to callers count from the top.
#[derive(Debug, Clone, Default)]
pub struct TvmStack {
    size: i32,
    binds: Vec<Option<DeclId>>,
}

impl TvmStack {
    pub fn size(&self) -> i32 {
        self.size
    }

    pub fn change(&mut self, diff: i32) {
        if diff != 0 {
            self.size += diff;
            assert!(self.size >= 0, "stack underflow: depth {}", self.size);
        }
    }

    pub fn change_tr(&mut self, take: i32, ret: i32) {
        assert!(take >= 0 && ret >= 0);
        self.change(ret - take);
    }

    /// Binds `decl` to the top slot. With `allocate` the slot is newly
    /// pushed, otherwise the existing top value is named.
    pub fn add(&mut self, decl: DeclId, allocate: bool) {
        if allocate {
            self.size += 1;
        }
        if (self.binds.len() as i32) < self.size {
            self.binds.resize(self.size as usize, None);
        }
        self.binds[(self.size - 1) as usize] = Some(decl);
    }

    pub fn is_bound(&self, decl: DeclId) -> bool {
        self.offset_of(decl).is_some()
    }

    /// Offset from the top of the most recent binding of `decl`.
    pub fn offset_of(&self, decl: DeclId) -> Option<i32> {
        for i in (0..self.size).rev() {
            if self.binds.get(i as usize).copied().flatten() == Some(decl) {
                return Some(self.size - 1 - i);
            }
        }
        None
    }

    pub fn ensure_size(&self, expected: i32, location: &str) {
        assert!(
            expected == self.size,
            "stack size error at {location}: expected {expected}, real {}",
            self.size
        );
    }

    /// Keeps only the top `n` slots, re-basing the model.
    pub fn take_last(&mut self, n: i32) {
        assert!(self.size >= n);
        let mut binds = vec![None; n as usize];
        for k in 0..n {
            let idx = self.size - n + k;
            binds[k as usize] = self.binds.get(idx as usize).copied().flatten();
        }
        self.binds = binds;
        self.size = n;
    }
}
