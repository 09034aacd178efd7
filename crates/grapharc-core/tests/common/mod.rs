//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use grapharc_core::{family, polymorphic, Archive, Object, Result, Serializable, TypeRegistry};
use std::cell::RefCell;
use std::rc::Rc;

pub trait Shape: Object {
    fn area(&self) -> f64;
}

#[derive(Debug, Default, PartialEq)]
pub struct Circle {
    pub radius: f64,
}

impl Serializable for Circle {
    fn serialize(&mut self, ar: &mut Archive<'_>) -> Result<()> {
        ar.serialize(&mut self.radius)
    }
}

impl Shape for Circle {
    fn area(&self) -> f64 {
        std::f64::consts::PI * self.radius * self.radius
    }
}

polymorphic!(Circle, "test.Circle", extends ["test.Shape"]);

#[derive(Debug, Default, PartialEq)]
pub struct Square {
    pub side: f64,
    pub label: String,
}

impl Serializable for Square {
    fn serialize(&mut self, ar: &mut Archive<'_>) -> Result<()> {
        ar.serialize(&mut self.side)?;
        ar.serialize(&mut self.label)
    }
}

impl Shape for Square {
    fn area(&self) -> f64 {
        self.side * self.side
    }
}

polymorphic!(Square, "test.Square", extends ["test.Shape"]);

family!(dyn Shape, "test.Shape", [Circle, Square]);

/// Registered, but not a shape
#[derive(Debug, Default, PartialEq)]
pub struct Label {
    pub text: String,
}

impl Serializable for Label {
    fn serialize(&mut self, ar: &mut Archive<'_>) -> Result<()> {
        ar.serialize(&mut self.text)
    }
}

polymorphic!(Label, "test.Label");

/// Node of a fully connected graph
#[derive(Default)]
pub struct MeshNode {
    pub id: u32,
    pub links: Vec<Rc<RefCell<MeshNode>>>,
}

impl Serializable for MeshNode {
    fn serialize(&mut self, ar: &mut Archive<'_>) -> Result<()> {
        ar.serialize(&mut self.id)?;
        ar.serialize(&mut self.links)
    }
}

polymorphic!(MeshNode, "test.MeshNode");

/// Binary tree with owned children
#[derive(Debug, Default, PartialEq)]
pub struct TreeNode {
    pub key: i64,
    pub left: Option<Box<TreeNode>>,
    pub right: Option<Box<TreeNode>>,
}

impl Serializable for TreeNode {
    fn serialize(&mut self, ar: &mut Archive<'_>) -> Result<()> {
        ar.serialize(&mut self.key)?;
        ar.serialize(&mut self.left)?;
        ar.serialize(&mut self.right)
    }
}

polymorphic!(TreeNode, "test.TreeNode");

impl TreeNode {
    pub fn insert(&mut self, key: i64) {
        let slot = if key < self.key { &mut self.left } else { &mut self.right };
        match slot.as_mut() {
            Some(child) => child.insert(key),
            None => {
                *slot = Some(Box::new(TreeNode {
                    key,
                    ..Default::default()
                }))
            }
        }
    }

    pub fn keys(&self) -> Vec<i64> {
        let mut keys = Vec::new();
        if let Some(left) = &self.left {
            keys.extend(left.keys());
        }
        keys.push(self.key);
        if let Some(right) = &self.right {
            keys.extend(right.keys());
        }
        keys
    }
}

pub fn registry() -> TypeRegistry {
    let registry = TypeRegistry::new();
    registry.register::<Circle>().unwrap();
    registry.register::<Square>().unwrap();
    registry.register::<Label>().unwrap();
    registry.register::<MeshNode>().unwrap();
    registry.register::<TreeNode>().unwrap();
    registry
}

/// Every node linked to every other node
pub fn mesh(size: u32) -> Vec<Rc<RefCell<MeshNode>>> {
    let nodes: Vec<_> = (0..size)
        .map(|id| {
            Rc::new(RefCell::new(MeshNode {
                id,
                links: Vec::new(),
            }))
        })
        .collect();
    for node in &nodes {
        let id = node.borrow().id;
        let others = nodes
            .iter()
            .filter(|other| other.borrow().id != id)
            .cloned()
            .collect();
        node.borrow_mut().links = others;
    }
    nodes
}

/// Drop all links so the reference cycles are released
pub fn unlink(nodes: &[Rc<RefCell<MeshNode>>]) {
    for node in nodes {
        node.borrow_mut().links.clear();
    }
}
