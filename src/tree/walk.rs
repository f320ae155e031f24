//! Pre-order traversal shared by every tree operation

use super::ChapterNode;

/// Whether a traversal keeps going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Visit the node's children, then its next sibling
    Continue,
    /// Skip the node's children
    SkipChildren,
    /// End the whole traversal
    Stop,
}

/// Where a visited node sits
#[derive(Debug, Clone, Copy)]
pub struct Position<'a> {
    /// Number of the parent, `None` for roots
    pub parent_num: Option<&'a str>,
    /// Key of the parent, `None` for roots
    pub parent_key: Option<&'a str>,
    /// 0-based index among siblings
    pub index: usize,
    pub depth: usize,
}

/// Visit `nodes` and their descendants in pre-order.
pub fn walk<'a, F>(nodes: &'a [ChapterNode], f: &mut F) -> Flow
where
    F: FnMut(&'a ChapterNode, Position<'a>) -> Flow,
{
    walk_from(nodes, None, 0, f)
}

fn walk_from<'a, F>(nodes: &'a [ChapterNode], parent: Option<&'a ChapterNode>, depth: usize, f: &mut F) -> Flow
where
    F: FnMut(&'a ChapterNode, Position<'a>) -> Flow,
{
    for (index, node) in nodes.iter().enumerate() {
        let position = Position {
            parent_num: parent.map(|p| p.num.as_str()),
            parent_key: parent.map(|p| p.key.as_str()),
            index,
            depth,
        };
        match f(node, position) {
            Flow::Stop => return Flow::Stop,
            Flow::SkipChildren => continue,
            Flow::Continue => {}
        }
        if walk_from(&node.children, Some(node), depth + 1, f) == Flow::Stop {
            return Flow::Stop;
        }
    }
    Flow::Continue
}

/// Visit `nodes` mutably in pre-order.
///
/// Children are visited after their parent's transform ran, so they see
/// the parent's updated number.
pub fn walk_mut<F>(nodes: &mut [ChapterNode], f: &mut F) -> Flow
where
    F: for<'p> FnMut(&mut ChapterNode, Position<'p>) -> Flow,
{
    walk_mut_from(nodes, None, 0, f)
}

fn walk_mut_from<F>(nodes: &mut [ChapterNode], parent: Option<(&str, &str)>, depth: usize, f: &mut F) -> Flow
where
    F: for<'p> FnMut(&mut ChapterNode, Position<'p>) -> Flow,
{
    for (index, node) in nodes.iter_mut().enumerate() {
        let position = Position {
            parent_num: parent.map(|(num, _)| num),
            parent_key: parent.map(|(_, key)| key),
            index,
            depth,
        };
        match f(node, position) {
            Flow::Stop => return Flow::Stop,
            Flow::SkipChildren => continue,
            Flow::Continue => {}
        }
        let ChapterNode { key, num, children, .. } = node;
        if walk_mut_from(children, Some((num.as_str(), key.as_str())), depth + 1, f) == Flow::Stop {
            return Flow::Stop;
        }
    }
    Flow::Continue
}
