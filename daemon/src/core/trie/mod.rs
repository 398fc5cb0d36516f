mod iterator;
mod node;

pub use iterator::TrieIterator;
pub use node::{common_prefix, key_to_nibbles, nibbles_to_key, Node};

use std::{collections::HashMap, sync::Arc};

use log::trace;
use nhb_common::{
    config::EMPTY_ROOT,
    crypto::Hash,
    serializer::Serializer,
};

use crate::core::{
    error::ChainError,
    storage::{Database, StorageError},
};

const NODE_PREFIX: &[u8] = b"trie-node:";
const ROOT_AT_PREFIX: &[u8] = b"trie-root-at:";
const LATEST_ROOT_KEY: &[u8] = b"trie-root-latest";

fn node_key(hash: &Hash) -> Vec<u8> {
    let mut key = Vec::with_capacity(NODE_PREFIX.len() + 32);
    key.extend_from_slice(NODE_PREFIX);
    key.extend_from_slice(hash.as_bytes());
    key
}

fn root_at_key(height: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(ROOT_AT_PREFIX.len() + 8);
    key.extend_from_slice(ROOT_AT_PREFIX);
    key.extend_from_slice(&height.to_be_bytes());
    key
}

enum Removal {
    NotFound,
    Empty,
    Node(Hash),
}

/// Authenticated key/value trie over 32-byte hashed keys.
///
/// Mutations are staged in memory: `put`/`delete` update the staged root
/// without touching the committed state until `commit` persists every
/// node reachable through dirty ancestors and records the root for the
/// block height. The radix structure is canonical, so equal leaf sets
/// hash to equal roots regardless of insertion order.
pub struct Trie {
    db: Arc<dyn Database>,
    root: Option<Hash>,
    committed_root: Option<Hash>,
    dirty: HashMap<Hash, Node>,
}

impl Trie {
    /// Open the trie at the latest committed root, or empty when fresh
    pub fn open(db: Arc<dyn Database>) -> Result<Self, ChainError> {
        let root = match db.get(LATEST_ROOT_KEY)? {
            Some(bytes) => {
                let root = Hash::from_bytes(&bytes)?;
                if root == EMPTY_ROOT {
                    None
                } else {
                    Some(root)
                }
            }
            None => None,
        };
        Ok(Trie {
            db,
            root: root.clone(),
            committed_root: root,
            dirty: HashMap::new(),
        })
    }

    /// Open against a specific historic root
    pub fn open_at(db: Arc<dyn Database>, root: &Hash) -> Result<Self, ChainError> {
        let mut trie = Trie::open(db)?;
        trie.reset(root)?;
        trie.committed_root = trie.root.clone();
        Ok(trie)
    }

    /// Root hash of the staged state
    pub fn hash(&self) -> Hash {
        self.root.clone().unwrap_or(EMPTY_ROOT)
    }

    /// Root hash as of the last commit
    pub fn committed_hash(&self) -> Hash {
        self.committed_root.clone().unwrap_or(EMPTY_ROOT)
    }

    /// Committed root recorded for a block height, if any
    pub fn root_at(&self, height: u64) -> Result<Option<Hash>, ChainError> {
        match self.db.get(&root_at_key(height))? {
            Some(bytes) => Ok(Some(Hash::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn node(&self, hash: &Hash) -> Result<Node, ChainError> {
        if let Some(node) = self.dirty.get(hash) {
            return Ok(node.clone());
        }
        let bytes = self
            .db
            .get(&node_key(hash))?
            .ok_or_else(|| StorageError::Corrupted(format!("trie node {}", hash)))?;
        Ok(Node::from_bytes(&bytes)?)
    }

    fn store(&mut self, node: Node) -> Hash {
        let hash = node.hash();
        self.dirty.insert(hash.clone(), node);
        hash
    }

    pub fn get(&self, key: &Hash) -> Result<Option<Vec<u8>>, ChainError> {
        let Some(mut current) = self.root.clone() else {
            return Ok(None);
        };
        let nibbles = key_to_nibbles(key);
        let mut offset = 0;
        loop {
            match self.node(&current)? {
                Node::Leaf { path, value } => {
                    return if nibbles[offset..] == path[..] {
                        Ok(Some(value))
                    } else {
                        Ok(None)
                    };
                }
                Node::Extension { path, child } => {
                    if nibbles[offset..].len() < path.len()
                        || nibbles[offset..offset + path.len()] != path[..]
                    {
                        return Ok(None);
                    }
                    offset += path.len();
                    current = child;
                }
                Node::Branch { children } => {
                    let index = nibbles[offset] as usize;
                    match &children[index] {
                        Some(child) => {
                            offset += 1;
                            current = child.clone();
                        }
                        None => return Ok(None),
                    }
                }
            }
        }
    }

    pub fn put(&mut self, key: &Hash, value: Vec<u8>) -> Result<(), ChainError> {
        let nibbles = key_to_nibbles(key);
        let root = self.root.clone();
        let new_root = self.insert_node(root, &nibbles, value)?;
        self.root = Some(new_root);
        Ok(())
    }

    pub fn delete(&mut self, key: &Hash) -> Result<(), ChainError> {
        let Some(root) = self.root.clone() else {
            return Ok(());
        };
        let nibbles = key_to_nibbles(key);
        match self.remove_node(root, &nibbles)? {
            Removal::NotFound => {}
            Removal::Empty => self.root = None,
            Removal::Node(hash) => self.root = Some(hash),
        }
        Ok(())
    }

    fn insert_node(
        &mut self,
        node_hash: Option<Hash>,
        path: &[u8],
        value: Vec<u8>,
    ) -> Result<Hash, ChainError> {
        let Some(hash) = node_hash else {
            return Ok(self.store(Node::Leaf {
                path: path.to_vec(),
                value,
            }));
        };
        match self.node(&hash)? {
            Node::Leaf {
                path: leaf_path,
                value: leaf_value,
            } => {
                if leaf_path == path {
                    return Ok(self.store(Node::Leaf {
                        path: leaf_path,
                        value,
                    }));
                }
                let common = common_prefix(&leaf_path, path);
                let mut children: [Option<Hash>; 16] = Default::default();
                let existing = self.store(Node::Leaf {
                    path: leaf_path[common + 1..].to_vec(),
                    value: leaf_value,
                });
                children[leaf_path[common] as usize] = Some(existing);
                let inserted = self.store(Node::Leaf {
                    path: path[common + 1..].to_vec(),
                    value,
                });
                children[path[common] as usize] = Some(inserted);
                let branch = self.store(Node::Branch { children });
                if common == 0 {
                    Ok(branch)
                } else {
                    Ok(self.store(Node::Extension {
                        path: path[..common].to_vec(),
                        child: branch,
                    }))
                }
            }
            Node::Extension {
                path: ext_path,
                child,
            } => {
                let common = common_prefix(&ext_path, path);
                if common == ext_path.len() {
                    let new_child = self.insert_node(Some(child), &path[common..], value)?;
                    return Ok(self.store(Node::Extension {
                        path: ext_path,
                        child: new_child,
                    }));
                }
                let mut children: [Option<Hash>; 16] = Default::default();
                let ext_rest = &ext_path[common + 1..];
                let ext_child = if ext_rest.is_empty() {
                    child
                } else {
                    self.store(Node::Extension {
                        path: ext_rest.to_vec(),
                        child,
                    })
                };
                children[ext_path[common] as usize] = Some(ext_child);
                let inserted = self.store(Node::Leaf {
                    path: path[common + 1..].to_vec(),
                    value,
                });
                children[path[common] as usize] = Some(inserted);
                let branch = self.store(Node::Branch { children });
                if common == 0 {
                    Ok(branch)
                } else {
                    Ok(self.store(Node::Extension {
                        path: path[..common].to_vec(),
                        child: branch,
                    }))
                }
            }
            Node::Branch { mut children } => {
                let index = path[0] as usize;
                let new_child = self.insert_node(children[index].clone(), &path[1..], value)?;
                children[index] = Some(new_child);
                Ok(self.store(Node::Branch { children }))
            }
        }
    }

    fn remove_node(&mut self, hash: Hash, path: &[u8]) -> Result<Removal, ChainError> {
        match self.node(&hash)? {
            Node::Leaf { path: leaf_path, .. } => {
                if leaf_path == path {
                    Ok(Removal::Empty)
                } else {
                    Ok(Removal::NotFound)
                }
            }
            Node::Extension {
                path: ext_path,
                child,
            } => {
                if path.len() < ext_path.len() || path[..ext_path.len()] != ext_path[..] {
                    return Ok(Removal::NotFound);
                }
                match self.remove_node(child, &path[ext_path.len()..])? {
                    Removal::NotFound => Ok(Removal::NotFound),
                    Removal::Empty => Ok(Removal::Empty),
                    Removal::Node(new_child) => {
                        Ok(Removal::Node(self.merge_prefix(ext_path, new_child)?))
                    }
                }
            }
            Node::Branch { mut children } => {
                let index = path[0] as usize;
                let Some(child) = children[index].clone() else {
                    return Ok(Removal::NotFound);
                };
                match self.remove_node(child, &path[1..])? {
                    Removal::NotFound => return Ok(Removal::NotFound),
                    Removal::Empty => children[index] = None,
                    Removal::Node(new_child) => children[index] = Some(new_child),
                }
                let mut remaining = children
                    .iter()
                    .enumerate()
                    .filter_map(|(i, c)| c.clone().map(|hash| (i, hash)));
                match (remaining.next(), remaining.next()) {
                    (None, _) => Ok(Removal::Empty),
                    (Some((only_index, only_child)), None) => {
                        // single remaining child collapses into its parent slot
                        Ok(Removal::Node(
                            self.merge_prefix(vec![only_index as u8], only_child)?,
                        ))
                    }
                    _ => Ok(Removal::Node(self.store(Node::Branch { children }))),
                }
            }
        }
    }

    // Prepend a nibble prefix to a subtree, folding into the child when
    // it is a leaf or extension so the structure stays canonical.
    fn merge_prefix(&mut self, prefix: Vec<u8>, child_hash: Hash) -> Result<Hash, ChainError> {
        match self.node(&child_hash)? {
            Node::Leaf { path, value } => {
                let mut merged = prefix;
                merged.extend_from_slice(&path);
                Ok(self.store(Node::Leaf {
                    path: merged,
                    value,
                }))
            }
            Node::Extension { path, child } => {
                let mut merged = prefix;
                merged.extend_from_slice(&path);
                Ok(self.store(Node::Extension {
                    path: merged,
                    child,
                }))
            }
            Node::Branch { .. } => Ok(self.store(Node::Extension {
                path: prefix,
                child: child_hash,
            })),
        }
    }

    /// Persist staged nodes and record the root for `height`
    pub fn commit(&mut self, height: u64) -> Result<Hash, ChainError> {
        if let Some(root) = self.root.clone() {
            self.persist(&root)?;
        }
        let root_hash = self.hash();
        self.db.put(&root_at_key(height), root_hash.as_bytes())?;
        self.db.put(LATEST_ROOT_KEY, root_hash.as_bytes())?;
        self.db.flush()?;
        trace!("committed trie root {} at height {}", root_hash, height);
        self.committed_root = self.root.clone();
        self.dirty.clear();
        Ok(root_hash)
    }

    // Walk from the root, writing dirty nodes; clean nodes and their
    // subtrees are already persisted.
    fn persist(&self, root: &Hash) -> Result<(), ChainError> {
        let mut stack = vec![root.clone()];
        while let Some(hash) = stack.pop() {
            let Some(node) = self.dirty.get(&hash) else {
                continue;
            };
            self.db.put(&node_key(&hash), &node.to_bytes())?;
            match node {
                Node::Leaf { .. } => {}
                Node::Extension { child, .. } => stack.push(child.clone()),
                Node::Branch { children } => {
                    stack.extend(children.iter().flatten().cloned());
                }
            }
        }
        Ok(())
    }

    /// Drop staged state and point at a committed root
    pub fn reset(&mut self, root: &Hash) -> Result<(), ChainError> {
        self.dirty.clear();
        if *root == EMPTY_ROOT {
            self.root = None;
            return Ok(());
        }
        if !self.db.contains(&node_key(root))? {
            return Err(StorageError::Corrupted(format!("unknown trie root {}", root)).into());
        }
        self.root = Some(root.clone());
        Ok(())
    }

    /// Lexicographic leaf iterator over the trie at `root`
    pub fn iter(&self, root: &Hash) -> Result<TrieIterator<'_>, ChainError> {
        TrieIterator::new(self, root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::storage::MemoryDatabase;
    use nhb_common::crypto::keccak256;

    fn trie() -> Trie {
        Trie::open(Arc::new(MemoryDatabase::new())).unwrap()
    }

    fn keys(n: u64) -> Vec<Hash> {
        (0..n).map(|i| keccak256(&i.to_be_bytes())).collect()
    }

    #[test]
    fn empty_root_is_constant() {
        assert_eq!(trie().hash(), EMPTY_ROOT);
    }

    #[test]
    fn get_put_delete() -> Result<(), ChainError> {
        let mut trie = trie();
        let key = keccak256(b"account");
        assert!(trie.get(&key)?.is_none());

        trie.put(&key, b"v1".to_vec())?;
        assert_eq!(trie.get(&key)?, Some(b"v1".to_vec()));

        trie.put(&key, b"v2".to_vec())?;
        assert_eq!(trie.get(&key)?, Some(b"v2".to_vec()));

        trie.delete(&key)?;
        assert!(trie.get(&key)?.is_none());
        assert_eq!(trie.hash(), EMPTY_ROOT);
        Ok(())
    }

    #[test]
    fn insertion_order_does_not_change_root() -> Result<(), ChainError> {
        let keys = keys(32);
        let mut forward = trie();
        for (i, key) in keys.iter().enumerate() {
            forward.put(key, i.to_be_bytes().to_vec())?;
        }
        let mut reverse = trie();
        for (i, key) in keys.iter().enumerate().rev() {
            reverse.put(key, i.to_be_bytes().to_vec())?;
        }
        assert_eq!(forward.hash(), reverse.hash());
        Ok(())
    }

    #[test]
    fn delete_restores_prior_root() -> Result<(), ChainError> {
        let keys = keys(16);
        let mut trie = trie();
        for key in &keys[..15] {
            trie.put(key, b"x".to_vec())?;
        }
        let before = trie.hash();
        trie.put(&keys[15], b"y".to_vec())?;
        assert_ne!(trie.hash(), before);
        trie.delete(&keys[15])?;
        assert_eq!(trie.hash(), before);
        Ok(())
    }

    #[test]
    fn commit_then_reload() -> Result<(), ChainError> {
        let db = Arc::new(MemoryDatabase::new());
        let mut trie = Trie::open(db.clone())?;
        for (i, key) in keys(8).iter().enumerate() {
            trie.put(key, vec![i as u8])?;
        }
        let root = trie.commit(1)?;

        let reloaded = Trie::open(db)?;
        assert_eq!(reloaded.hash(), root);
        assert_eq!(reloaded.root_at(1)?, Some(root));
        for (i, key) in keys(8).iter().enumerate() {
            assert_eq!(reloaded.get(key)?, Some(vec![i as u8]));
        }
        Ok(())
    }

    #[test]
    fn reset_discards_staged_state() -> Result<(), ChainError> {
        let mut trie = trie();
        let key = keccak256(b"a");
        trie.put(&key, b"1".to_vec())?;
        let committed = trie.commit(1)?;
        trie.put(&keccak256(b"b"), b"2".to_vec())?;
        assert_ne!(trie.hash(), committed);
        trie.reset(&committed)?;
        assert_eq!(trie.hash(), committed);
        assert!(trie.get(&keccak256(b"b"))?.is_none());
        Ok(())
    }

    #[test]
    fn iteration_is_lexicographic() -> Result<(), ChainError> {
        let mut trie = trie();
        let mut expected: Vec<(Hash, Vec<u8>)> = keys(64)
            .into_iter()
            .map(|key| {
                let value = key.as_bytes()[..4].to_vec();
                (key, value)
            })
            .collect();
        for (key, value) in &expected {
            trie.put(key, value.clone())?;
        }
        let root = trie.commit(1)?;
        expected.sort_by(|a, b| a.0.cmp(&b.0));

        let collected: Vec<(Hash, Vec<u8>)> = trie
            .iter(&root)?
            .collect::<Result<Vec<_>, ChainError>>()?;
        assert_eq!(collected, expected);
        Ok(())
    }
}
