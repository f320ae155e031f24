//! Dotted chapter numbering
//!
//! Chapter numbers look like `2.1.3`. Display order compares them as
//! natural strings: digit runs by value, everything else by character.

use std::cmp::Ordering;

/// Number of the child at 0-based `position` under `parent_num`.
pub fn child_num(parent_num: &str, position: usize) -> String {
    format!("{}.{}", parent_num, position + 1)
}

/// Number for a new root: one past the largest integer root number, or 1.
pub fn next_root_num<'a>(root_nums: impl IntoIterator<Item = &'a str>) -> String {
    let max = root_nums
        .into_iter()
        .filter_map(|num| num.trim().parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    (max + 1).to_string()
}

/// Natural comparison of chapter numbers, so `1.10` sorts after `1.9`.
pub fn compare_nums(a: &str, b: &str) -> Ordering {
    let mut left = Segments::new(a);
    let mut right = Segments::new(b);

    loop {
        match (left.next(), right.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) => {
                let ord = match (l, r) {
                    (Segment::Digits(l), Segment::Digits(r)) => compare_digit_runs(l, r),
                    (Segment::Digits(_), Segment::Text(_)) => Ordering::Less,
                    (Segment::Text(_), Segment::Digits(_)) => Ordering::Greater,
                    (Segment::Text(l), Segment::Text(r)) => l.to_lowercase().cmp(&r.to_lowercase()),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

fn compare_digit_runs(l: &str, r: &str) -> Ordering {
    let l = l.trim_start_matches('0');
    let r = r.trim_start_matches('0');
    l.len().cmp(&r.len()).then_with(|| l.cmp(r))
}

enum Segment<'a> {
    Digits(&'a str),
    Text(&'a str),
}

struct Segments<'a> {
    rest: &'a str,
}

impl<'a> Segments<'a> {
    fn new(s: &'a str) -> Self {
        Self { rest: s }
    }
}

impl<'a> Iterator for Segments<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let first = self.rest.chars().next()?;
        let digits = first.is_ascii_digit();
        let end = self
            .rest
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() != digits)
            .map(|(i, _)| i)
            .unwrap_or(self.rest.len());
        let (head, tail) = self.rest.split_at(end);
        self.rest = tail;
        Some(if digits {
            Segment::Digits(head)
        } else {
            Segment::Text(head)
        })
    }
}
