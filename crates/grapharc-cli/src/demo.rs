//! Object graphs used by the demonstration commands.

use crate::draw::Drawable;
use bytemuck::{Pod, Zeroable};
use grapharc_core::{
    family, polymorphic, Archive, Object, Plain, Result, Serializable, TextBuf, TypeRegistry,
};
use rand::Rng;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, LinkedList, VecDeque};
use std::rc::Rc;

/// Register every demo type in `registry`
pub fn register(registry: &TypeRegistry) -> Result<()> {
    registry.register::<Node>()?;
    registry.register::<WeightedNode>()?;
    registry.register::<Peer>()?;
    registry.register::<Entry>()?;
    registry.register::<Caption>()?;
    registry.register::<Sample>()?;
    Ok(())
}

// ----------------------------------------------------------------------
// Binary tree with a derived node type
// ----------------------------------------------------------------------

/// Shared link to any member of the node family
pub type Link = Rc<RefCell<dyn Branch>>;

/// Common interface of the tree nodes
pub trait Branch: Object {
    /// Text shown when the tree is drawn
    fn label(&self) -> String;

    /// Left and right children
    fn children(&self) -> (Option<Link>, Option<Link>);
}

/// Plain tree node
#[derive(Default)]
pub struct Node {
    pub data: i32,
    pub left: Option<Link>,
    pub right: Option<Link>,
}

impl Serializable for Node {
    fn serialize(&mut self, ar: &mut Archive<'_>) -> Result<()> {
        ar.serialize(&mut self.data)?;
        ar.serialize(&mut self.left)?;
        ar.serialize(&mut self.right)
    }
}

impl Branch for Node {
    fn label(&self) -> String {
        self.data.to_string()
    }

    fn children(&self) -> (Option<Link>, Option<Link>) {
        (self.left.clone(), self.right.clone())
    }
}

polymorphic!(Node, "grapharc.demo.Node");

/// A node carrying an extra weight on top of the plain node fields
#[derive(Default)]
pub struct WeightedNode {
    pub base: Node,
    pub weight: u16,
}

impl Serializable for WeightedNode {
    fn serialize(&mut self, ar: &mut Archive<'_>) -> Result<()> {
        self.base.serialize(ar)?;
        ar.serialize(&mut self.weight)
    }
}

impl Branch for WeightedNode {
    fn label(&self) -> String {
        format!("{}/{}", self.base.data, self.weight)
    }

    fn children(&self) -> (Option<Link>, Option<Link>) {
        self.base.children()
    }
}

polymorphic!(WeightedNode, "grapharc.demo.WeightedNode", extends ["grapharc.demo.Node"]);

family!(dyn Branch, "grapharc.demo.Node", [Node, WeightedNode]);

impl Drawable for Link {
    fn label(&self) -> String {
        self.borrow().label()
    }

    fn left(&self) -> Option<Self> {
        self.borrow().children().0
    }

    fn right(&self) -> Option<Self> {
        self.borrow().children().1
    }
}

fn branch(data: i32, left: Option<Link>, right: Option<Link>) -> Option<Link> {
    // every third node is the derived type
    let link: Link = if data % 3 == 0 {
        Rc::new(RefCell::new(WeightedNode {
            base: Node { data, left, right },
            weight: (data * 10) as u16,
        }))
    } else {
        Rc::new(RefCell::new(Node { data, left, right }))
    };
    Some(link)
}

fn leaf(data: i32) -> Option<Link> {
    branch(data, None, None)
}

/// The fifteen node sample tree
pub fn sample_tree() -> Option<Link> {
    branch(
        1,
        branch(
            2,
            branch(4, leaf(9), None),
            branch(5, branch(10, None, leaf(8)), leaf(11)),
        ),
        branch(
            3,
            branch(6, leaf(12), leaf(13)),
            branch(7, leaf(14), leaf(15)),
        ),
    )
}

// ----------------------------------------------------------------------
// Fully connected mesh
// ----------------------------------------------------------------------

/// Named vertex linked to other vertices
#[derive(Default)]
pub struct Peer {
    pub name: String,
    pub links: Vec<Rc<RefCell<Peer>>>,
}

impl Serializable for Peer {
    fn serialize(&mut self, ar: &mut Archive<'_>) -> Result<()> {
        ar.serialize(&mut self.name)?;
        ar.serialize(&mut self.links)
    }
}

polymorphic!(Peer, "grapharc.demo.Peer");

/// Peers named `a`, `b`, ... each linked to all the others
pub fn mesh(size: u8) -> Vec<Rc<RefCell<Peer>>> {
    let peers: Vec<_> = (0..size)
        .map(|index| {
            Rc::new(RefCell::new(Peer {
                name: char::from(b'a' + index).to_string(),
                links: Vec::new(),
            }))
        })
        .collect();
    for (index, peer) in peers.iter().enumerate() {
        let others = peers
            .iter()
            .enumerate()
            .filter(|(other, _)| *other != index)
            .map(|(_, other)| Rc::clone(other))
            .collect();
        peer.borrow_mut().links = others;
    }
    peers
}

/// Break the reference cycles of a mesh
pub fn unlink(peers: &[Rc<RefCell<Peer>>]) {
    for peer in peers {
        peer.borrow_mut().links.clear();
    }
}

/// Check that every peer links to every other peer exactly once
pub fn is_complete(peers: &[Rc<RefCell<Peer>>]) -> bool {
    peers.iter().all(|peer| {
        let peer_ref = peer.borrow();
        let links = &peer_ref.links;
        links.len() == peers.len() - 1
            && peers
                .iter()
                .filter(|other| !Rc::ptr_eq(*other, peer))
                .all(|other| links.iter().filter(|link| Rc::ptr_eq(*link, other)).count() == 1)
    })
}

// ----------------------------------------------------------------------
// Search tree passed back and forth
// ----------------------------------------------------------------------

/// Binary search tree entry
#[derive(Debug, Default)]
pub struct Entry {
    pub name: String,
    pub value: i32,
    pub left: Option<Rc<RefCell<Entry>>>,
    pub right: Option<Rc<RefCell<Entry>>>,
}

impl Entry {
    pub fn new(name: &str, value: i32) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            name: name.to_string(),
            value,
            ..Default::default()
        }))
    }

    /// Insert below this entry; equal values go right
    pub fn insert(&mut self, entry: Rc<RefCell<Entry>>) {
        let slot = if entry.borrow().value < self.value {
            &mut self.left
        } else {
            &mut self.right
        };
        match slot.as_ref() {
            Some(child) => child.borrow_mut().insert(entry),
            None => *slot = Some(entry),
        }
    }

    /// Number of entries in this subtree
    pub fn count(&self) -> usize {
        let below = |side: &Option<Rc<RefCell<Entry>>>| {
            side.as_ref().map_or(0, |entry| entry.borrow().count())
        };
        1 + below(&self.left) + below(&self.right)
    }

    /// Values in order
    pub fn values(&self) -> Vec<i32> {
        let mut values = Vec::new();
        if let Some(left) = &self.left {
            values.extend(left.borrow().values());
        }
        values.push(self.value);
        if let Some(right) = &self.right {
            values.extend(right.borrow().values());
        }
        values
    }
}

impl Serializable for Entry {
    fn serialize(&mut self, ar: &mut Archive<'_>) -> Result<()> {
        ar.serialize(&mut self.name)?;
        ar.serialize(&mut self.value)?;
        ar.serialize(&mut self.left)?;
        ar.serialize(&mut self.right)
    }
}

polymorphic!(Entry, "grapharc.demo.Entry");

impl Drawable for Rc<RefCell<Entry>> {
    fn label(&self) -> String {
        let entry = self.borrow();
        format!("{}:{}", entry.name, entry.value)
    }

    fn left(&self) -> Option<Self> {
        self.borrow().left.clone()
    }

    fn right(&self) -> Option<Self> {
        self.borrow().right.clone()
    }
}

// ----------------------------------------------------------------------
// One field of every category
// ----------------------------------------------------------------------

/// Fixed layout record archived as raw bytes
#[derive(Debug, Clone, Copy, PartialEq, Zeroable, Pod)]
#[repr(C)]
pub struct Record {
    pub a: i32,
    pub b: u8,
    pub _pad: [u8; 3],
}

impl Record {
    pub fn new(a: i32, b: u8) -> Plain<Self> {
        Plain(Self { a, b, _pad: [0; 3] })
    }
}

/// Small object stored by value, boxed and shared
#[derive(Debug, Default, PartialEq)]
pub struct Caption {
    pub text: String,
}

impl Caption {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
        }
    }
}

impl Serializable for Caption {
    fn serialize(&mut self, ar: &mut Archive<'_>) -> Result<()> {
        ar.serialize(&mut self.text)
    }
}

polymorphic!(Caption, "grapharc.demo.Caption");

/// Tree node holding one field of every supported category
#[derive(Debug, Default, PartialEq)]
pub struct Sample {
    pub letter: char,
    pub number: i32,
    pub flag: bool,
    pub wide: u64,
    pub real: f64,
    pub chars: TextBuf<20>,
    pub ints: [i32; 10],
    pub reals: [f64; 2],

    pub caption: Caption,
    pub caption_box: Option<Box<Caption>>,
    pub caption_none: Option<Box<Caption>>,
    pub captions: [Caption; 3],
    pub caption_shared: Option<Rc<RefCell<Caption>>>,

    pub record: Plain<Record>,
    pub record_box: Option<Box<Plain<Record>>>,
    pub record_none: Option<Box<Plain<Record>>>,
    pub records: [Plain<Record>; 4],
    pub record_shared: Option<Rc<RefCell<Plain<Record>>>>,

    pub array: [i32; 5],
    pub vector: Vec<i32>,
    pub list: LinkedList<i32>,
    pub deque: VecDeque<i16>,
    pub map: BTreeMap<i32, i32>,
    pub lookup: HashMap<String, u8>,

    pub left: Option<Box<Sample>>,
    pub right: Option<Box<Sample>>,
}

impl Sample {
    /// Populate the fixed fields and a random mix of collection entries
    pub fn new<R: Rng>(letter: char, number: i32, rng: &mut R) -> Self {
        let shared = Rc::new(RefCell::new(Caption::new("shared")));
        let mut sample = Self {
            letter,
            number,
            flag: number % 2 == 0,
            wide: u64::MAX - number as u64,
            real: 2.2,
            chars: TextBuf::try_from("qwertyuiop").unwrap_or_default(),
            ints: [9, 8, 7, 6, 5, 4, 3, 2, 1, 0],
            reals: [3.3, 4.4],
            caption: Caption::new("member"),
            caption_box: Some(Box::new(Caption::new("boxed"))),
            captions: [Caption::new("x"), Caption::new("y"), Caption::new("z")],
            caption_shared: Some(shared),
            record: Record::new(number, letter as u8),
            record_box: Some(Box::new(Record::new(-number, 1))),
            records: [
                Record::new(1, 2),
                Record::new(3, 4),
                Record::new(5, 6),
                Record::new(7, 8),
            ],
            record_shared: Some(Rc::new(RefCell::new(Record::new(42, 7)))),
            ..Default::default()
        };
        for _ in 0..rng.gen_range(15..=25) {
            match rng.gen_range(0..6) {
                0 => sample.array[rng.gen_range(0..5)] = rng.gen_range(0..10),
                1 => {
                    sample.map.insert(rng.gen_range(0..10), rng.gen_range(0..10));
                }
                2 => sample.list.push_back(rng.gen_range(0..10)),
                3 => sample.vector.push(rng.gen_range(0..10)),
                4 => sample.deque.push_front(rng.gen_range(-9..10)),
                _ => {
                    sample
                        .lookup
                        .insert(format!("k{}", rng.gen_range(0..10)), rng.gen());
                }
            }
        }
        sample
    }

    fn with_children(mut self, left: Option<Sample>, right: Option<Sample>) -> Self {
        self.left = left.map(Box::new);
        self.right = right.map(Box::new);
        self
    }
}

impl Serializable for Sample {
    fn serialize(&mut self, ar: &mut Archive<'_>) -> Result<()> {
        ar.serialize(&mut self.letter)?;
        ar.serialize(&mut self.number)?;
        ar.serialize(&mut self.flag)?;
        ar.serialize(&mut self.wide)?;
        ar.serialize(&mut self.real)?;
        ar.serialize(&mut self.chars)?;
        ar.serialize(&mut self.ints)?;
        ar.serialize(&mut self.reals)?;

        ar.serialize(&mut self.caption)?;
        ar.serialize(&mut self.caption_box)?;
        ar.serialize(&mut self.caption_none)?;
        ar.serialize(&mut self.captions)?;
        ar.serialize(&mut self.caption_shared)?;

        ar.serialize(&mut self.record)?;
        ar.serialize(&mut self.record_box)?;
        ar.serialize(&mut self.record_none)?;
        ar.serialize(&mut self.records)?;
        ar.serialize(&mut self.record_shared)?;

        ar.serialize(&mut self.array)?;
        ar.serialize(&mut self.vector)?;
        ar.serialize(&mut self.list)?;
        ar.serialize(&mut self.deque)?;
        ar.serialize(&mut self.map)?;
        ar.serialize(&mut self.lookup)?;

        ar.serialize(&mut self.left)?;
        ar.serialize(&mut self.right)
    }
}

polymorphic!(Sample, "grapharc.demo.Sample");

impl<'a> Drawable for &'a Sample {
    fn label(&self) -> String {
        let list: Vec<String> = self.list.iter().map(i32::to_string).collect();
        format!(
            "{},{} A:{:?} V:{:?} L:({}){{{}}} M:{:?}",
            self.letter,
            self.number,
            self.array,
            self.vector,
            self.list.len(),
            list.join("->"),
            self.map,
        )
    }

    fn left(&self) -> Option<Self> {
        self.left.as_deref()
    }

    fn right(&self) -> Option<Self> {
        self.right.as_deref()
    }
}

/// The nine node sample tree
pub fn sample_types<R: Rng>(rng: &mut R) -> Sample {
    let mut node = |letter, number| Sample::new(letter, number, &mut *rng);
    let e = node('e', 50);
    let t = node('t', 40);
    let r = node('r', 45).with_children(None, Some(t));
    let w = node('w', 55).with_children(Some(e), Some(r));
    let o = node('o', 25);
    let i = node('i', 30).with_children(Some(o), None);
    let p = node('p', 20);
    let u = node('u', 35).with_children(Some(i), Some(p));
    node('q', 60).with_children(Some(w), Some(u))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draw::draw;
    use grapharc_core::MemoryTransport;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn registry() -> TypeRegistry {
        let registry = TypeRegistry::new();
        register(&registry).unwrap();
        registry
    }

    #[test]
    fn test_sample_tree_shape() {
        let tree = sample_tree().unwrap();
        let drawing = draw(&tree, false);
        assert_eq!(drawing.lines().count(), 15);
        assert!(drawing.starts_with("1\n+-->2\n"));
        assert!(drawing.contains("3/30"));
    }

    #[test]
    fn test_node_family_roundtrip() {
        let registry = registry();
        let mut source = sample_tree();
        let expected = draw(source.as_ref().unwrap(), true);

        let mut transport = MemoryTransport::new();
        Archive::new(&mut transport)
            .with_registry(&registry)
            .save(&mut source)
            .unwrap();
        transport.rewind();

        let mut loaded: Option<Link> = None;
        Archive::new(&mut transport)
            .with_registry(&registry)
            .load(&mut loaded)
            .unwrap();
        let loaded = loaded.unwrap();
        assert_eq!(draw(&loaded, true), expected);
        assert!(loaded
            .borrow()
            .children()
            .1
            .unwrap()
            .borrow()
            .as_any()
            .is::<WeightedNode>());
    }

    #[test]
    fn test_mesh_is_complete() {
        let peers = mesh(5);
        assert!(is_complete(&peers));
        peers[0].borrow_mut().links.pop();
        assert!(!is_complete(&peers));
        unlink(&peers);
    }

    #[test]
    fn test_entry_insert_keeps_order() {
        let root = Entry::new("root", 5);
        for value in [3, 8, 5, 1, 9] {
            root.borrow_mut().insert(Entry::new("x", value));
        }
        let root = root.borrow();
        assert_eq!(root.count(), 6);
        assert_eq!(root.values(), vec![1, 3, 5, 5, 8, 9]);
    }

    #[test]
    fn test_sample_types_roundtrip() {
        let registry = registry();
        let mut rng = StdRng::seed_from_u64(7);
        let mut source = sample_types(&mut rng);

        let mut transport = MemoryTransport::new();
        let mut ar = Archive::new(&mut transport).with_registry(&registry);
        ar.save(&mut source).unwrap();
        ar.checkpoint().unwrap();
        drop(ar);
        transport.rewind();

        let mut loaded = Sample::default();
        let mut ar = Archive::new(&mut transport).with_registry(&registry);
        ar.load(&mut loaded).unwrap();
        ar.checkpoint().unwrap();
        assert_eq!(loaded, source);
        assert!(loaded.caption_none.is_none());
        assert_eq!(draw(&&loaded, true), draw(&&source, true));
    }
}
