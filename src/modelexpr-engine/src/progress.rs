// Copyright 2026 The Modelexpr Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::ops::{BitOr, BitOrAssign};

/// Outcome of one pass over a tree or an equation set.  Drivers repeat a
/// pass until it reports `Stable`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Progress {
    #[default]
    Stable,
    Changed,
}

impl Progress {
    pub fn changed(self) -> bool {
        self == Progress::Changed
    }
}

impl From<bool> for Progress {
    fn from(changed: bool) -> Self {
        if changed {
            Progress::Changed
        } else {
            Progress::Stable
        }
    }
}

impl BitOr for Progress {
    type Output = Progress;

    fn bitor(self, rhs: Progress) -> Progress {
        (self.changed() || rhs.changed()).into()
    }
}

impl BitOrAssign for Progress {
    fn bitor_assign(&mut self, rhs: Progress) {
        *self = *self | rhs;
    }
}

#[test]
fn test_progress_combines() {
    let mut p = Progress::Stable;
    p |= Progress::Stable;
    assert!(!p.changed());
    p |= Progress::Changed;
    assert_eq!(Progress::Changed, p);
    assert_eq!(Progress::Changed, Progress::Changed | Progress::Stable);
    assert_eq!(Progress::Stable, Progress::from(false));
}
