use angle_xml::{Arena, Node};

use crate::atomic::{atomic_equal, Atomic};
use crate::error::{Error, Result};
use crate::item::Item;

/// An ordered, possibly empty sequence of items.
///
/// Sequences never nest; concatenation flattens by construction.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sequence(Vec<Item>);

impl Sequence {
    pub fn new() -> Self {
        Sequence(Vec::new())
    }

    pub fn singleton(item: impl Into<Item>) -> Self {
        Sequence(vec![item.into()])
    }

    pub fn from_nodes(nodes: impl IntoIterator<Item = Node>) -> Self {
        Sequence(nodes.into_iter().map(Item::Node).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn items(&self) -> &[Item] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Item> {
        self.0.iter()
    }

    pub fn first(&self) -> Option<&Item> {
        self.0.first()
    }

    pub fn push(&mut self, item: impl Into<Item>) {
        self.0.push(item.into());
    }

    pub fn append(&mut self, other: Sequence) {
        self.0.extend(other.0);
    }

    pub fn concat(mut self, other: Sequence) -> Sequence {
        self.append(other);
        self
    }

    /// The single item of a one-item sequence.
    pub fn exactly_one(&self) -> Result<&Item> {
        match self.0.as_slice() {
            [item] => Ok(item),
            _ => Err(Error::Type(format!(
                "expected a single item, got {}",
                self.len()
            ))),
        }
    }

    /// Zero or one items.
    pub fn at_most_one(&self) -> Result<Option<&Item>> {
        match self.0.as_slice() {
            [] => Ok(None),
            [item] => Ok(Some(item)),
            _ => Err(Error::Type(format!(
                "expected at most one item, got {}",
                self.len()
            ))),
        }
    }

    /// All items as nodes; fails on the first atomic.
    pub fn nodes(&self) -> Result<Vec<Node>> {
        self.0.iter().map(|item| item.to_node()).collect()
    }

    /// Drop duplicates, by identity for nodes and by value equality for
    /// atomics, keeping first occurrences.
    pub fn unique(&self) -> Sequence {
        let mut out: Vec<Item> = Vec::with_capacity(self.0.len());
        for item in &self.0 {
            let seen = out.iter().any(|kept| match (kept, item) {
                (Item::Node(a), Item::Node(b)) => a == b,
                (Item::Atomic(a), Item::Atomic(b)) => atomic_equal(a, b),
                _ => false,
            });
            if !seen {
                out.push(item.clone());
            }
        }
        Sequence(out)
    }

    /// The effective boolean value of the whole sequence.
    ///
    /// Empty is false; a singleton follows its item rule; a longer sequence
    /// is true when it starts with a node and a type error otherwise.
    pub fn effective_boolean(&self) -> Result<bool> {
        match self.0.as_slice() {
            [] => Ok(false),
            [item] => item.effective_boolean(),
            [Item::Node(_), ..] => Ok(true),
            _ => Err(Error::Type(
                "no effective boolean value for a multi-item sequence".to_string(),
            )),
        }
    }

    pub fn atomized(&self, arena: &Arena) -> Vec<Atomic> {
        self.0.iter().map(|item| item.atomized(arena)).collect()
    }

    /// String value of a sequence expected to be empty or singleton.
    pub fn string_value(&self, arena: &Arena) -> Result<String> {
        Ok(match self.at_most_one()? {
            Some(item) => item.string_value(arena),
            None => String::new(),
        })
    }

    /// Join the string values of every item.
    pub fn string_values_joined(&self, separator: &str) -> String {
        // atomic-only variant, used where no arena is in reach
        self.0
            .iter()
            .map(|item| match item {
                Item::Atomic(a) => a.string_value(),
                Item::Node(_) => String::new(),
            })
            .collect::<Vec<_>>()
            .join(separator)
    }

    pub fn string_values(&self, arena: &Arena) -> Vec<String> {
        self.0.iter().map(|item| item.string_value(arena)).collect()
    }

    pub fn into_items(self) -> Vec<Item> {
        self.0
    }
}

impl From<Vec<Item>> for Sequence {
    fn from(items: Vec<Item>) -> Self {
        Sequence(items)
    }
}

impl From<Item> for Sequence {
    fn from(item: Item) -> Self {
        Sequence(vec![item])
    }
}

impl From<Atomic> for Sequence {
    fn from(a: Atomic) -> Self {
        Sequence(vec![Item::Atomic(a)])
    }
}

impl FromIterator<Item> for Sequence {
    fn from_iter<T: IntoIterator<Item = Item>>(iter: T) -> Self {
        Sequence(iter.into_iter().collect())
    }
}

impl IntoIterator for Sequence {
    type Item = Item;
    type IntoIter = std::vec::IntoIter<Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Sort nodes into document order and drop duplicate identities.
pub fn sorted_by_document_order(nodes: Vec<Node>, arena: &Arena) -> Vec<Node> {
    let mut nodes = nodes;
    nodes.sort_by(|a, b| arena.compare_document_order(*a, *b));
    nodes.dedup();
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_by_value_for_atomics() {
        let seq: Sequence = vec![
            Item::Atomic(Atomic::Integer(1)),
            Item::Atomic(Atomic::Double(1.0)),
            Item::Atomic(Atomic::Integer(2)),
        ]
        .into();
        assert_eq!(seq.unique().len(), 2);
    }

    #[test]
    fn ebv_of_multi_item_atomics_is_an_error() {
        let seq: Sequence = vec![
            Item::Atomic(Atomic::Integer(1)),
            Item::Atomic(Atomic::Integer(2)),
        ]
        .into();
        assert!(seq.effective_boolean().is_err());
    }

    #[test]
    fn ebv_of_empty_is_false() {
        assert!(!Sequence::new().effective_boolean().unwrap());
    }
}
