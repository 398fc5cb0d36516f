use nhb_common::{config::EMPTY_ROOT, crypto::Hash};

use super::{node::nibbles_to_key, Node, Trie};
use crate::core::{error::ChainError, storage::StorageError};

struct Frame {
    node: Node,
    next_child: usize,
    appended: usize,
}

enum Step {
    Yield { suffix: Vec<u8>, value: Vec<u8> },
    Descend { child: Hash, path: Vec<u8> },
    Pop,
}

/// Depth-first leaf walk in nibble order, which is lexicographic order
/// over the packed 32-byte keys. Snapshots rely on this ordering to make
/// equal state produce byte-identical chunks.
pub struct TrieIterator<'a> {
    trie: &'a Trie,
    stack: Vec<Frame>,
    path: Vec<u8>,
    failed: bool,
}

impl<'a> TrieIterator<'a> {
    pub(super) fn new(trie: &'a Trie, root: &Hash) -> Result<Self, ChainError> {
        let mut iter = TrieIterator {
            trie,
            stack: Vec::new(),
            path: Vec::new(),
            failed: false,
        };
        if *root != EMPTY_ROOT {
            let node = trie.node(root)?;
            iter.stack.push(Frame {
                node,
                next_child: 0,
                appended: 0,
            });
        }
        Ok(iter)
    }

    fn push(&mut self, child: &Hash, appended_path: &[u8]) -> Result<(), ChainError> {
        let node = self.trie.node(child)?;
        self.path.extend_from_slice(appended_path);
        self.stack.push(Frame {
            node,
            next_child: 0,
            appended: appended_path.len(),
        });
        Ok(())
    }

    fn pop(&mut self) {
        if let Some(frame) = self.stack.pop() {
            self.path.truncate(self.path.len() - frame.appended);
        }
    }

    fn plan(&self) -> Option<(Step, usize)> {
        let frame = self.stack.last()?;
        Some(match &frame.node {
            Node::Leaf { path, value } => (
                Step::Yield {
                    suffix: path.clone(),
                    value: value.clone(),
                },
                frame.next_child,
            ),
            Node::Extension { path, child } => {
                if frame.next_child == 0 {
                    (
                        Step::Descend {
                            child: child.clone(),
                            path: path.clone(),
                        },
                        1,
                    )
                } else {
                    (Step::Pop, frame.next_child)
                }
            }
            Node::Branch { children } => {
                let next = (frame.next_child..16)
                    .find_map(|index| children[index].clone().map(|child| (index, child)));
                match next {
                    Some((index, child)) => (
                        Step::Descend {
                            child,
                            path: vec![index as u8],
                        },
                        index + 1,
                    ),
                    None => (Step::Pop, frame.next_child),
                }
            }
        })
    }

    fn step(&mut self) -> Result<Option<(Hash, Vec<u8>)>, ChainError> {
        loop {
            let Some((step, next_child)) = self.plan() else {
                return Ok(None);
            };
            if let Some(frame) = self.stack.last_mut() {
                frame.next_child = next_child;
            }
            match step {
                Step::Yield { suffix, value } => {
                    let mut nibbles = self.path.clone();
                    nibbles.extend_from_slice(&suffix);
                    self.pop();
                    let key = nibbles_to_key(&nibbles).ok_or_else(|| {
                        StorageError::Corrupted("leaf key is not 32 bytes".into())
                    })?;
                    return Ok(Some((key, value)));
                }
                Step::Descend { child, path } => self.push(&child, &path)?,
                Step::Pop => self.pop(),
            }
        }
    }
}

impl<'a> Iterator for TrieIterator<'a> {
    type Item = Result<(Hash, Vec<u8>), ChainError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.step() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => None,
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}
