//! Byte-level storage of compressed tag streams in chains of molecules.
//!
//! A molecule is a 20-byte block allocated from a
//! [`ProximityPool`](crate::core::pool::ProximityPool). The front of a
//! molecule holds content atoms; its back holds the tag of the next molecule
//! in the chain, compressed against the molecule's own tag and written
//! backward from byte 19. The last molecule of a chain has [`STOP_ATOM`] in
//! byte 19 and 19 bytes of room for content.
//!
//! Content is a stream of compressed tags. It ends at a [`STOP_ATOM`] found
//! on a tag boundary, or at the end of the last molecule. Unused bytes after
//! the content are filled with [`STOP_ATOM`]; together with the rule that
//! every molecule except the head holds at least one content atom, this lets
//! the end of the content be found from the tail molecule alone.

use crate::core::collections::AtomBuffer;
use crate::core::pool::ProximityPool;
use crate::core::tag::{AllocIndex, STOP_ATOM, TERMINATOR_BIT, Tag, TagDecoder, push_compressed};

/// Size of a molecule in bytes.
pub const MOLECULE_SIZE: usize = 20;

/// One molecule.
pub type Molecule = [u8; MOLECULE_SIZE];

/// Pool that stores every molecule of a complex.
pub type MoleculePool = ProximityPool<Molecule>;

/// Content bytes available in the last molecule of a chain.
const LAST_TEXT_LEN: usize = MOLECULE_SIZE - 1;

const EMPTY_MOLECULE: Molecule = [STOP_ATOM; MOLECULE_SIZE];

fn molecule(pool: &MoleculePool, tag: Tag) -> &Molecule {
    match pool.get(tag) {
        Some(cule) => cule,
        None => panic!("molecule {tag} is not allocated"),
    }
}

fn store(pool: &mut MoleculePool, tag: Tag, cule: Molecule) {
    match pool.get_mut(tag) {
        Some(slot) => *slot = cule,
        None => panic!("molecule {tag} is not allocated"),
    }
}

/// Reads the link at the back of `cule`: the next molecule's tag (if any)
/// and the number of content bytes in front of the link.
///
/// # Panics
///
/// Panics if the link bytes are corrupt.
#[must_use]
pub fn read_link(cule: &Molecule, own: Tag) -> (Option<Tag>, usize) {
    if cule[MOLECULE_SIZE - 1] == STOP_ATOM {
        return (None, LAST_TEXT_LEN);
    }
    let mut decoder = TagDecoder::new(own);
    for (count, &atom) in cule.iter().rev().enumerate() {
        match decoder.push(atom) {
            Some(Some(next)) => return (Some(next), MOLECULE_SIZE - 1 - count),
            Some(None) => {}
            None => break,
        }
    }
    panic!("molecule {own} has a corrupt link");
}

/// Writes the link to `next` at the back of `cule` and returns the number of
/// content bytes left in front of it.
pub fn write_link(cule: &mut Molecule, own: Tag, next: Option<Tag>) -> usize {
    let Some(next) = next else {
        cule[MOLECULE_SIZE - 1] = STOP_ATOM;
        return LAST_TEXT_LEN;
    };
    let mut atoms = AtomBuffer::new();
    push_compressed(own, next, &mut atoms);
    for (i, &atom) in atoms.iter().enumerate() {
        cule[MOLECULE_SIZE - 1 - i] = atom;
    }
    MOLECULE_SIZE - atoms.len()
}

/// Length of the content held by the last molecule of a chain.
///
/// `is_head` tells whether the molecule is also the head; only a head can
/// hold no content at all.
#[must_use]
pub fn tail_content_len(cule: &Molecule, is_head: bool) -> usize {
    let text = &cule[..LAST_TEXT_LEN];
    let run_start = text
        .iter()
        .rposition(|&atom| atom != STOP_ATOM)
        .map_or(0, |i| i + 1);
    if run_start == LAST_TEXT_LEN {
        return LAST_TEXT_LEN;
    }
    if run_start == 0 {
        // A non-head tail starts with the last atom of a tag begun in the
        // previous molecule.
        return usize::from(!is_head);
    }
    if text[run_start - 1] & TERMINATOR_BIT == 0 {
        // The first fill byte is really the final atom of a tag.
        run_start + 1
    } else {
        run_start
    }
}

/// Handle to a chain of molecules, named by the tag of its head.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MoleculeChain {
    head: Tag,
}

impl MoleculeChain {
    /// Allocates an empty chain (a single head molecule).
    pub fn new(pool: &mut MoleculePool, alloc_index: AllocIndex) -> Self {
        let (head, cule) = pool.allocate(alloc_index);
        *cule = EMPTY_MOLECULE;
        Self { head }
    }

    /// Wraps an existing chain.
    #[must_use]
    pub const fn from_head(head: Tag) -> Self {
        Self { head }
    }

    /// Tag of the head molecule.
    #[must_use]
    pub const fn head(self) -> Tag {
        self.head
    }

    /// Forward cursor over the content atoms.
    #[must_use]
    pub fn reader(self, pool: &MoleculePool) -> ChainReader<'_> {
        ChainReader::new(pool, self.head)
    }

    /// All content atoms.
    #[must_use]
    pub fn content(self, pool: &MoleculePool) -> AtomBuffer {
        self.reader(pool).collect()
    }

    /// Returns true when the chain holds no content.
    #[must_use]
    pub fn is_empty(self, pool: &MoleculePool) -> bool {
        molecule(pool, self.head)[0] == STOP_ATOM
    }

    /// Tag of the last molecule.
    #[must_use]
    pub fn tail(self, pool: &MoleculePool) -> Tag {
        let mut tag = self.head;
        while let (Some(next), _) = read_link(molecule(pool, tag), tag) {
            tag = next;
        }
        tag
    }

    /// Number of molecules in the chain.
    #[must_use]
    pub fn molecules(self, pool: &MoleculePool) -> usize {
        let mut count = 1;
        let mut tag = self.head;
        while let (Some(next), _) = read_link(molecule(pool, tag), tag) {
            tag = next;
            count += 1;
        }
        count
    }

    /// Bytes occupied by the chain.
    #[must_use]
    pub fn bytes(self, pool: &MoleculePool) -> usize {
        self.molecules(pool) * MOLECULE_SIZE
    }

    /// Replaces the content from byte `offset` onward with `atoms`,
    /// allocating or freeing molecules as needed. Returns the new tail.
    ///
    /// `offset` must not exceed the current content length. The rewrite
    /// starts in the molecule that holds byte `offset - 1`, so a cut that
    /// lands on a molecule boundary never leaves an empty tail behind.
    pub fn rewrite_from(self, pool: &mut MoleculePool, offset: usize, atoms: &[u8]) -> Tag {
        let mut tag = self.head;
        let mut start = 0;
        loop {
            match read_link(molecule(pool, tag), tag) {
                (Some(next), text_len) if offset > start + text_len => {
                    start += text_len;
                    tag = next;
                }
                _ => break,
            }
        }
        let keep = offset - start;
        let mut data = AtomBuffer::from_slice(&molecule(pool, tag)[..keep]);
        data.extend_from_slice(atoms);
        write_from(pool, tag, &data)
    }

    /// Replaces the whole content with `atoms`, rewriting only from the
    /// first byte that changes. Returns the new tail.
    pub fn replace_content(self, pool: &mut MoleculePool, atoms: &[u8]) -> Tag {
        let old = self.content(pool);
        let common = old.iter().zip(atoms).take_while(|(a, b)| a == b).count();
        self.rewrite_from(pool, common, &atoms[common..])
    }

    /// Appends `atoms` after the content, starting from the known tail
    /// molecule. Returns the new tail.
    pub fn append(self, pool: &mut MoleculePool, tail: Tag, atoms: &[u8]) -> Tag {
        let cule = molecule(pool, tail);
        let end = tail_content_len(cule, tail == self.head);
        let mut data = AtomBuffer::from_slice(&cule[..end]);
        data.extend_from_slice(atoms);
        write_from(pool, tail, &data)
    }

    /// Empties the chain, keeping only the head molecule.
    pub fn clear(self, pool: &mut MoleculePool) {
        if let (Some(next), _) = read_link(molecule(pool, self.head), self.head) {
            free_from(pool, next);
        }
        store(pool, self.head, EMPTY_MOLECULE);
    }

    /// Frees every molecule of the chain.
    pub fn free(self, pool: &mut MoleculePool) {
        free_from(pool, self.head);
    }
}

/// Writes `data` starting at byte 0 of molecule `start`, reusing the
/// molecules that follow it and freeing the ones no longer needed.
fn write_from(pool: &mut MoleculePool, start: Tag, data: &[u8]) -> Tag {
    let alloc_index = pool.allocation_index(start).unwrap_or(0);
    let mut tag = start;
    let mut rest = data;
    loop {
        let (existing, _) = read_link(molecule(pool, tag), tag);
        let mut cule = EMPTY_MOLECULE;
        if rest.len() <= LAST_TEXT_LEN {
            cule[..rest.len()].copy_from_slice(rest);
            store(pool, tag, cule);
            if let Some(next) = existing {
                free_from(pool, next);
            }
            return tag;
        }
        let next = existing.unwrap_or_else(|| {
            let (next, fresh) = pool.allocate(alloc_index);
            *fresh = EMPTY_MOLECULE;
            next
        });
        let text_len = write_link(&mut cule, tag, Some(next));
        cule[..text_len].copy_from_slice(&rest[..text_len]);
        store(pool, tag, cule);
        rest = &rest[text_len..];
        tag = next;
    }
}

fn free_from(pool: &mut MoleculePool, first: Tag) {
    let mut tag = Some(first);
    while let Some(current) = tag {
        tag = read_link(molecule(pool, current), current).0;
        pool.free(current);
    }
}

/// Restartable forward cursor over the content atoms of a chain.
#[derive(Clone, Debug)]
pub struct ChainReader<'a> {
    pool: &'a MoleculePool,
    head: Tag,
    cule: Molecule,
    index: usize,
    text_len: usize,
    next: Option<Tag>,
    at_boundary: bool,
    done: bool,
}

impl<'a> ChainReader<'a> {
    fn new(pool: &'a MoleculePool, head: Tag) -> Self {
        let mut reader = Self {
            pool,
            head,
            cule: EMPTY_MOLECULE,
            index: 0,
            text_len: 0,
            next: None,
            at_boundary: true,
            done: false,
        };
        reader.load(head);
        reader
    }

    fn load(&mut self, tag: Tag) {
        self.cule = *molecule(self.pool, tag);
        let (next, text_len) = read_link(&self.cule, tag);
        self.next = next;
        self.text_len = text_len;
        self.index = 0;
    }

    /// Rewinds to the first atom.
    pub fn restart(&mut self) {
        self.at_boundary = true;
        self.done = false;
        self.load(self.head);
    }
}

impl Iterator for ChainReader<'_> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        if self.done {
            return None;
        }
        if self.index == self.text_len {
            match self.next {
                Some(next) => self.load(next),
                None => {
                    self.done = true;
                    return None;
                }
            }
        }
        let atom = self.cule[self.index];
        if self.at_boundary && atom == STOP_ATOM {
            self.done = true;
            return None;
        }
        self.index += 1;
        self.at_boundary = atom & TERMINATOR_BIT != 0;
        Some(atom)
    }
}

/// Iterator that decodes the content of a chain as tags compressed against a
/// single ground tag.
#[derive(Clone, Debug)]
pub struct ChainTags<'a> {
    reader: ChainReader<'a>,
    ground: Tag,
}

impl<'a> ChainTags<'a> {
    /// Decodes `chain` against `ground`.
    #[must_use]
    pub fn new(pool: &'a MoleculePool, chain: MoleculeChain, ground: Tag) -> Self {
        Self {
            reader: chain.reader(pool),
            ground,
        }
    }

    /// Rewinds to the first tag.
    pub fn restart(&mut self) {
        self.reader.restart();
    }

    /// Decodes the next tag against `ground` instead of the chain's own
    /// ground. Streams that interleave tags with different grounds use this.
    pub fn next_with_ground(&mut self, ground: Tag) -> Option<Tag> {
        let mut decoder = TagDecoder::new(ground);
        for atom in self.reader.by_ref() {
            match decoder.push(atom) {
                Some(Some(tag)) => return Some(tag),
                Some(None) => {}
                None => break,
            }
        }
        None
    }
}

impl Iterator for ChainTags<'_> {
    type Item = Tag;

    fn next(&mut self) -> Option<Tag> {
        self.next_with_ground(self.ground)
    }
}
