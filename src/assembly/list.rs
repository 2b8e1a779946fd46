//! Arena backed, doubly linked instruction list.
//!
//! Instructions are addressed by [`InstrId`] handles that stay valid for the lifetime of the
//! list: inserting or removing other instructions never moves a node, so branch targets and
//! exception handler boundaries can refer to instructions by identity. Removed nodes stay in
//! the arena detached from the chain; looking them up yields `None`.

use serde::{Deserialize, Serialize};

use crate::{assembly::instruction::Instruction, Error, Result};

/// Stable handle of an instruction inside one [`InstructionList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrId(u32);

impl InstrId {
    /// Creates a handle from its raw arena index.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        InstrId(index)
    }

    /// The raw arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Node {
    instruction: Instruction,
    prev: Option<InstrId>,
    next: Option<InstrId>,
    attached: bool,
}

/// An ordered sequence of instructions with stable identities.
///
/// Deserialization checks that the links form one chain from `head` to `tail` covering exactly
/// the attached nodes, so a loaded list can always be walked to its end.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "RawInstructionList")]
pub struct InstructionList {
    nodes: Vec<Node>,
    head: Option<InstrId>,
    tail: Option<InstrId>,
    len: usize,
}

#[derive(Deserialize)]
struct RawInstructionList {
    nodes: Vec<Node>,
    head: Option<InstrId>,
    tail: Option<InstrId>,
    len: usize,
}

impl TryFrom<RawInstructionList> for InstructionList {
    type Error = Error;

    fn try_from(raw: RawInstructionList) -> Result<Self> {
        let list = InstructionList {
            nodes: raw.nodes,
            head: raw.head,
            tail: raw.tail,
            len: raw.len,
        };
        list.check_links()?;
        Ok(list)
    }
}

impl InstructionList {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of attached instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no instruction is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The first instruction.
    #[must_use]
    pub fn first(&self) -> Option<InstrId> {
        self.head
    }

    /// The last instruction.
    #[must_use]
    pub fn last(&self) -> Option<InstrId> {
        self.tail
    }

    fn node(&self, id: InstrId) -> Option<&Node> {
        self.nodes.get(id.index()).filter(|node| node.attached)
    }

    fn node_mut(&mut self, id: InstrId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index()).filter(|node| node.attached)
    }

    fn allocate(&mut self, instruction: Instruction) -> Result<InstrId> {
        let index = u32::try_from(self.nodes.len())
            .map_err(|_| malformed_error!("Instruction arena exceeds u32 range"))?;
        self.nodes.push(Node {
            instruction,
            prev: None,
            next: None,
            attached: true,
        });
        self.len += 1;
        Ok(InstrId(index))
    }

    fn set_prev(&mut self, id: Option<InstrId>, prev: Option<InstrId>) {
        if let Some(node) = id.and_then(|id| self.node_mut(id)) {
            node.prev = prev;
        }
    }

    fn set_next(&mut self, id: Option<InstrId>, next: Option<InstrId>) {
        if let Some(node) = id.and_then(|id| self.node_mut(id)) {
            node.next = next;
        }
    }

    fn check_links(&self) -> Result<()> {
        let mut seen = vec![false; self.nodes.len()];
        let mut count = 0usize;
        let mut prev = None;
        let mut cursor = self.head;

        while let Some(id) = cursor {
            let node = self
                .node(id)
                .ok_or_else(|| malformed_error!("Link to missing instruction #{}", id.index()))?;
            match seen.get_mut(id.index()) {
                Some(visited) if !*visited => *visited = true,
                _ => return Err(malformed_error!("Instruction #{} is linked twice", id.index())),
            }
            if node.prev != prev {
                return Err(malformed_error!(
                    "Instruction #{} does not link back to its predecessor",
                    id.index()
                ));
            }
            count += 1;
            prev = Some(id);
            cursor = node.next;
        }

        if prev != self.tail {
            return Err(malformed_error!("Tail is not the end of the instruction chain"));
        }
        let attached = self.nodes.iter().filter(|node| node.attached).count();
        if count != self.len || attached != self.len {
            return Err(malformed_error!(
                "Instruction chain holds {} of {} attached nodes, length says {}",
                count,
                attached,
                self.len
            ));
        }
        Ok(())
    }

    fn dangling(id: InstrId) -> Error {
        Error::DanglingReference(format!("instruction #{} is not in the list", id.index()))
    }

    /// Appends an instruction.
    ///
    /// # Errors
    ///
    /// Fails only if the arena outgrows the handle range.
    pub fn push(&mut self, instruction: Instruction) -> Result<InstrId> {
        let id = self.allocate(instruction)?;
        let tail = self.tail;
        if let Some(node) = self.nodes.get_mut(id.index()) {
            node.prev = tail;
        }
        self.set_next(tail, Some(id));
        if self.head.is_none() {
            self.head = Some(id);
        }
        self.tail = Some(id);
        Ok(id)
    }

    /// Inserts `instruction` directly after `anchor`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::DanglingReference`] if `anchor` is not in the list.
    pub fn insert_after(&mut self, anchor: InstrId, instruction: Instruction) -> Result<InstrId> {
        let next = self.node(anchor).ok_or_else(|| Self::dangling(anchor))?.next;
        let id = self.allocate(instruction)?;
        if let Some(node) = self.nodes.get_mut(id.index()) {
            node.prev = Some(anchor);
            node.next = next;
        }
        self.set_next(Some(anchor), Some(id));
        match next {
            Some(_) => self.set_prev(next, Some(id)),
            None => self.tail = Some(id),
        }
        Ok(id)
    }

    /// Inserts `instruction` directly before `anchor`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::DanglingReference`] if `anchor` is not in the list.
    pub fn insert_before(&mut self, anchor: InstrId, instruction: Instruction) -> Result<InstrId> {
        let prev = self.node(anchor).ok_or_else(|| Self::dangling(anchor))?.prev;
        let id = self.allocate(instruction)?;
        if let Some(node) = self.nodes.get_mut(id.index()) {
            node.prev = prev;
            node.next = Some(anchor);
        }
        self.set_prev(Some(anchor), Some(id));
        match prev {
            Some(_) => self.set_next(prev, Some(id)),
            None => self.head = Some(id),
        }
        Ok(id)
    }

    /// Detaches an instruction and returns a copy of it.
    ///
    /// Anything still referring to `id` afterwards is dangling.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::DanglingReference`] if `id` is not in the list.
    pub fn remove(&mut self, id: InstrId) -> Result<Instruction> {
        let node = self.node_mut(id).ok_or_else(|| Self::dangling(id))?;
        node.attached = false;
        let (prev, next) = (node.prev.take(), node.next.take());
        let instruction = node.instruction.clone();

        match prev {
            Some(_) => self.set_next(prev, next),
            None => self.head = next,
        }
        match next {
            Some(_) => self.set_prev(next, prev),
            None => self.tail = prev,
        }
        self.len -= 1;
        Ok(instruction)
    }

    /// Returns `true` if `id` is attached to this list.
    #[must_use]
    pub fn contains(&self, id: InstrId) -> bool {
        self.node(id).is_some()
    }

    /// The instruction behind `id`, if attached.
    #[must_use]
    pub fn get(&self, id: InstrId) -> Option<&Instruction> {
        self.node(id).map(|node| &node.instruction)
    }

    /// Mutable access to the instruction behind `id`, if attached.
    pub fn get_mut(&mut self, id: InstrId) -> Option<&mut Instruction> {
        self.node_mut(id).map(|node| &mut node.instruction)
    }

    /// The instruction following `id`.
    #[must_use]
    pub fn next(&self, id: InstrId) -> Option<InstrId> {
        self.node(id).and_then(|node| node.next)
    }

    /// The instruction preceding `id`.
    #[must_use]
    pub fn prev(&self, id: InstrId) -> Option<InstrId> {
        self.node(id).and_then(|node| node.prev)
    }

    /// Iterates over attached instructions in order.
    #[must_use]
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }

    /// Snapshot of all handles in order.
    #[must_use]
    pub fn ids(&self) -> Vec<InstrId> {
        self.iter().map(|(id, _)| id).collect()
    }

    /// Zero based position of `id` in the current order.
    #[must_use]
    pub fn position(&self, id: InstrId) -> Option<usize> {
        self.iter().position(|(candidate, _)| candidate == id)
    }

    /// Handle of the instruction at position `n`.
    #[must_use]
    pub fn nth(&self, n: usize) -> Option<InstrId> {
        self.iter().nth(n).map(|(id, _)| id)
    }
}

impl FromIterator<Instruction> for InstructionList {
    fn from_iter<T: IntoIterator<Item = Instruction>>(iter: T) -> Self {
        let mut list = InstructionList::new();
        for instruction in iter {
            // Only fails past u32::MAX nodes.
            if list.push(instruction).is_err() {
                break;
            }
        }
        list
    }
}

/// Iterator over `(handle, instruction)` pairs of an [`InstructionList`].
pub struct Iter<'a> {
    list: &'a InstructionList,
    cursor: Option<InstrId>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (InstrId, &'a Instruction);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        let node = self.list.node(id)?;
        self.cursor = node.next;
        Some((id, &node.instruction))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::opcodes::OpCode;

    fn opcodes(list: &InstructionList) -> Vec<OpCode> {
        list.iter().map(|(_, instr)| instr.opcode).collect()
    }

    #[test]
    fn insert_keeps_handles_stable() {
        let mut list = InstructionList::new();
        let first = list.push(Instruction::simple(OpCode::Nop)).unwrap();
        let last = list.push(Instruction::simple(OpCode::Ret)).unwrap();

        let middle = list.insert_after(first, Instruction::simple(OpCode::Dup)).unwrap();
        let front = list.insert_before(first, Instruction::simple(OpCode::Ldnull)).unwrap();
        let back = list.insert_after(last, Instruction::simple(OpCode::Pop)).unwrap();

        assert_eq!(
            opcodes(&list),
            vec![OpCode::Ldnull, OpCode::Nop, OpCode::Dup, OpCode::Ret, OpCode::Pop]
        );
        assert_eq!(list.first(), Some(front));
        assert_eq!(list.last(), Some(back));
        assert_eq!(list.get(first).map(|i| i.opcode), Some(OpCode::Nop));
        assert_eq!(list.next(first), Some(middle));
        assert_eq!(list.prev(last), Some(middle));
        assert_eq!(list.position(last), Some(3));
        assert_eq!(list.nth(2), Some(middle));
        assert_eq!(list.len(), 5);
    }

    #[test]
    fn remove_detaches() {
        let mut list: InstructionList = [OpCode::Nop, OpCode::Dup, OpCode::Ret]
            .into_iter()
            .map(Instruction::simple)
            .collect();
        let ids = list.ids();

        let removed = list.remove(ids[1]).unwrap();
        assert_eq!(removed.opcode, OpCode::Dup);
        assert!(!list.contains(ids[1]));
        assert_eq!(list.next(ids[0]), Some(ids[2]));
        assert_eq!(list.len(), 2);

        assert!(matches!(list.remove(ids[1]), Err(Error::DanglingReference(_))));
        assert!(list.insert_after(ids[1], Instruction::simple(OpCode::Nop)).is_err());

        list.remove(ids[0]).unwrap();
        list.remove(ids[2]).unwrap();
        assert!(list.is_empty());
        assert_eq!(list.first(), None);
        assert_eq!(list.last(), None);
    }

    #[test]
    fn deserialize_rejects_broken_links() {
        let mut list: InstructionList = [OpCode::Nop, OpCode::Dup, OpCode::Pop, OpCode::Ret]
            .into_iter()
            .map(Instruction::simple)
            .collect();
        list.remove(list.ids()[2]).unwrap();
        let json = serde_json::to_value(&list).unwrap();

        let loaded: InstructionList = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(opcodes(&loaded), [OpCode::Nop, OpCode::Dup, OpCode::Ret]);
        assert_eq!(loaded.len(), 3);

        let mut cyclic = json.clone();
        cyclic["nodes"][3]["next"] = 0.into();
        assert!(serde_json::from_value::<InstructionList>(cyclic).is_err());

        let mut wrong_len = json.clone();
        wrong_len["len"] = 4.into();
        assert!(serde_json::from_value::<InstructionList>(wrong_len).is_err());

        let mut one_way = json.clone();
        one_way["nodes"][1]["prev"] = serde_json::Value::Null;
        assert!(serde_json::from_value::<InstructionList>(one_way).is_err());

        let mut short_tail = json.clone();
        short_tail["tail"] = 1.into();
        assert!(serde_json::from_value::<InstructionList>(short_tail).is_err());

        let mut revived = json;
        revived["nodes"][2]["attached"] = true.into();
        assert!(serde_json::from_value::<InstructionList>(revived).is_err());
    }
}
