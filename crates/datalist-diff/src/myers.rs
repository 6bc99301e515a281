#![forbid(unsafe_code)]

//! Linear-space Myers search.
//!
//! Finds the diagonals (runs of identity-equal items) of a shortest edit
//! script between two sequences, using the divide-and-conquer "middle
//! snake" refinement so memory stays `O(N + M)`.
//!
//! # Invariants
//!
//! 1. Returned diagonals are sorted by `x` and strictly increasing in both
//!    `x` and `y`; they never overlap.
//! 2. Every `(x + i, y + i)` inside a diagonal satisfies `same(x + i, y + i)`.
//! 3. The search visits `O((N + M) * D)` cells where `D` is the edit
//!    distance.

use datalist_core::Cx;

use crate::DiffError;

/// How often (in `d` steps) the search polls for cancellation.
const CANCEL_POLL_MASK: isize = 0x1f;

/// A run of matching items: `old[x..x + size]` pairs with `new[y..y + size]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Diagonal {
    pub x: usize,
    pub y: usize,
    pub size: usize,
}

impl Diagonal {
    pub fn end_x(&self) -> usize {
        self.x + self.size
    }

    pub fn end_y(&self) -> usize {
        self.y + self.size
    }
}

#[derive(Debug, Clone, Copy)]
struct Range {
    old_start: isize,
    old_end: isize,
    new_start: isize,
    new_end: isize,
}

impl Range {
    fn old_size(&self) -> isize {
        self.old_end - self.old_start
    }

    fn new_size(&self) -> isize {
        self.new_end - self.new_start
    }
}

#[derive(Debug, Clone, Copy)]
struct Snake {
    start_x: isize,
    start_y: isize,
    end_x: isize,
    end_y: isize,
    reverse: bool,
}

impl Snake {
    fn has_addition_or_removal(&self) -> bool {
        self.end_y - self.start_y != self.end_x - self.start_x
    }

    fn is_addition(&self) -> bool {
        self.end_y - self.start_y > self.end_x - self.start_x
    }

    fn diagonal_size(&self) -> isize {
        (self.end_x - self.start_x).min(self.end_y - self.start_y)
    }

    /// The matching run inside the snake, stripped of its single edit.
    fn to_diagonal(self) -> Diagonal {
        let (x, y, size) = if !self.has_addition_or_removal() {
            (self.start_x, self.start_y, self.end_x - self.start_x)
        } else if self.reverse {
            // The edit sits at the far end of a reverse snake.
            (self.start_x, self.start_y, self.diagonal_size())
        } else if self.is_addition() {
            (self.start_x, self.start_y + 1, self.diagonal_size())
        } else {
            (self.start_x + 1, self.start_y, self.diagonal_size())
        };
        Diagonal {
            x: x as usize,
            y: y as usize,
            size: size as usize,
        }
    }
}

/// Furthest-reaching `x` per diagonal `k`, indexable by negative `k`.
struct CenteredArray {
    data: Vec<isize>,
    mid: isize,
}

impl CenteredArray {
    fn new(size: usize) -> Self {
        Self {
            data: vec![0; size],
            mid: (size / 2) as isize,
        }
    }

    fn get(&self, k: isize) -> isize {
        self.data[(k + self.mid) as usize]
    }

    fn set(&mut self, k: isize, value: isize) {
        self.data[(k + self.mid) as usize] = value;
    }
}

struct Search<'a, F> {
    same: &'a F,
    forward: CenteredArray,
    backward: CenteredArray,
}

impl<F> Search<'_, F>
where
    F: Fn(usize, usize) -> bool,
{
    fn same(&self, x: isize, y: isize) -> bool {
        (self.same)(x as usize, y as usize)
    }

    fn mid_point(&mut self, range: &Range, cx: &Cx) -> Result<Option<Snake>, DiffError> {
        if range.old_size() < 1 || range.new_size() < 1 {
            return Ok(None);
        }
        let max = (range.old_size() + range.new_size() + 1) / 2;
        self.forward.set(1, range.old_start);
        self.backward.set(1, range.old_end);
        for d in 0..max {
            if d & CANCEL_POLL_MASK == 0 && cx.is_cancelled() {
                return Err(DiffError::Cancelled);
            }
            if let Some(snake) = self.forward_step(range, d) {
                return Ok(Some(snake));
            }
            if let Some(snake) = self.backward_step(range, d) {
                return Ok(Some(snake));
            }
        }
        Ok(None)
    }

    fn forward_step(&mut self, range: &Range, d: isize) -> Option<Snake> {
        let delta = range.old_size() - range.new_size();
        let check_for_snake = delta.abs() % 2 == 1;
        let mut k = -d;
        while k <= d {
            let start_x;
            let mut x;
            if k == -d || (k != d && self.forward.get(k + 1) > self.forward.get(k - 1)) {
                start_x = self.forward.get(k + 1);
                x = start_x;
            } else {
                start_x = self.forward.get(k - 1);
                x = start_x + 1;
            }
            let mut y = range.new_start + (x - range.old_start) - k;
            let start_y = if d == 0 || x != start_x { y } else { y - 1 };
            while x < range.old_end && y < range.new_end && self.same(x, y) {
                x += 1;
                y += 1;
            }
            self.forward.set(k, x);
            if check_for_snake {
                let backward_k = delta - k;
                if backward_k >= -d + 1 && backward_k <= d - 1 && self.backward.get(backward_k) <= x
                {
                    return Some(Snake {
                        start_x,
                        start_y,
                        end_x: x,
                        end_y: y,
                        reverse: false,
                    });
                }
            }
            k += 2;
        }
        None
    }

    fn backward_step(&mut self, range: &Range, d: isize) -> Option<Snake> {
        let delta = range.old_size() - range.new_size();
        let check_for_snake = delta % 2 == 0;
        let mut k = -d;
        while k <= d {
            let start_x;
            let mut x;
            if k == -d || (k != d && self.backward.get(k + 1) < self.backward.get(k - 1)) {
                start_x = self.backward.get(k + 1);
                x = start_x;
            } else {
                start_x = self.backward.get(k - 1);
                x = start_x - 1;
            }
            let mut y = range.new_end - ((range.old_end - x) - k);
            let start_y = if d == 0 || x != start_x { y } else { y + 1 };
            while x > range.old_start && y > range.new_start && self.same(x - 1, y - 1) {
                x -= 1;
                y -= 1;
            }
            self.backward.set(k, x);
            if check_for_snake {
                let forward_k = delta - k;
                if forward_k >= -d && forward_k <= d && self.forward.get(forward_k) >= x {
                    return Some(Snake {
                        start_x: x,
                        start_y: y,
                        end_x: start_x,
                        end_y: start_y,
                        reverse: true,
                    });
                }
            }
            k += 2;
        }
        None
    }
}

/// Find the matching diagonals between `old_len` and `new_len` items.
///
/// `same(x, y)` reports whether `old[x]` and `new[y]` are the same item.
pub(crate) fn find_diagonals<F>(
    old_len: usize,
    new_len: usize,
    same: &F,
    cx: &Cx,
) -> Result<Vec<Diagonal>, DiffError>
where
    F: Fn(usize, usize) -> bool,
{
    let mut diagonals = Vec::new();
    let mut stack = vec![Range {
        old_start: 0,
        old_end: old_len as isize,
        new_start: 0,
        new_end: new_len as isize,
    }];
    let max = (old_len + new_len).div_ceil(2);
    let mut search = Search {
        same,
        forward: CenteredArray::new(max * 2 + 1),
        backward: CenteredArray::new(max * 2 + 1),
    };

    while let Some(range) = stack.pop() {
        let Some(snake) = search.mid_point(&range, cx)? else {
            continue;
        };
        if snake.diagonal_size() > 0 {
            diagonals.push(snake.to_diagonal());
        }
        stack.push(Range {
            old_start: range.old_start,
            old_end: snake.start_x,
            new_start: range.new_start,
            new_end: snake.start_y,
        });
        stack.push(Range {
            old_start: snake.end_x,
            old_end: range.old_end,
            new_start: snake.end_y,
            new_end: range.new_end,
        });
    }

    diagonals.sort_by_key(|d| d.x);
    Ok(diagonals)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diagonals(old: &str, new: &str) -> Vec<Diagonal> {
        let old: Vec<char> = old.chars().collect();
        let new: Vec<char> = new.chars().collect();
        let (cx, _ctrl) = Cx::background();
        find_diagonals(old.len(), new.len(), &|x, y| old[x] == new[y], &cx).unwrap()
    }

    fn matched(diagonals: &[Diagonal]) -> usize {
        diagonals.iter().map(|d| d.size).sum()
    }

    #[test]
    fn identical_sequences_form_one_diagonal() {
        assert_eq!(
            diagonals("abcdef", "abcdef"),
            vec![Diagonal { x: 0, y: 0, size: 6 }]
        );
    }

    #[test]
    fn disjoint_sequences_have_no_diagonals() {
        assert!(diagonals("abc", "xyz").is_empty());
        assert!(diagonals("", "xyz").is_empty());
        assert!(diagonals("abc", "").is_empty());
    }

    #[test]
    fn finds_longest_common_subsequence_length() {
        // LCS("abcabba", "cbabac") == 4 (e.g. "baba" / "caba").
        assert_eq!(matched(&diagonals("abcabba", "cbabac")), 4);
        assert_eq!(matched(&diagonals("abc", "acd")), 2);
        assert_eq!(matched(&diagonals("kitten", "sitting")), 4);
    }

    #[test]
    fn diagonals_are_sorted_and_disjoint() {
        let ds = diagonals("the quick brown fox", "a quick brown dog");
        for pair in ds.windows(2) {
            assert!(pair[0].end_x() <= pair[1].x);
            assert!(pair[0].end_y() <= pair[1].y);
        }
    }

    #[test]
    fn cancelled_search_reports_cancellation() {
        let old: Vec<u32> = (0..500).collect();
        let new: Vec<u32> = (0..500).rev().collect();
        let (cx, ctrl) = Cx::background();
        ctrl.cancel();
        let out = find_diagonals(old.len(), new.len(), &|x, y| old[x] == new[y], &cx);
        assert_eq!(out, Err(DiffError::Cancelled));
    }
}
