//! ASCII rendering of binary trees.
//!
//! ```text
//! 1
//! +-->2
//! |   \-->4
//! \-->3
//! ```

use std::fmt::Write;

/// A handle to a node with at most two children
pub trait Drawable: Sized {
    /// Text printed for this node
    fn label(&self) -> String;

    /// Handle to the left child, if any
    fn left(&self) -> Option<Self>;

    /// Handle to the right child, if any
    fn right(&self) -> Option<Self>;
}

/// Render the tree below `root`.
///
/// With `nulls` set, a missing child next to a present one is drawn as a
/// `x` branch so left and right stay distinguishable.
pub fn draw<T: Drawable>(root: &T, nulls: bool) -> String {
    let mut out = String::new();
    draw_node(&mut out, root, nulls, "");
    out
}

fn draw_node<T: Drawable>(out: &mut String, node: &T, nulls: bool, indent: &str) {
    let _ = writeln!(out, "{}", node.label());
    let left = node.left();
    let right = node.right();

    if let Some(left) = &left {
        let more = right.is_some() || nulls;
        out.push_str(indent);
        out.push_str(if more { "+-->" } else { "\\-->" });
        let nested = format!("{indent}{}", if more { "|   " } else { "    " });
        draw_node(out, left, nulls, &nested);
        if right.is_none() && nulls {
            let _ = writeln!(out, "{indent}\\--x");
        }
    }

    if let Some(right) = &right {
        if left.is_none() && nulls {
            let _ = writeln!(out, "{indent}+--x");
        }
        out.push_str(indent);
        out.push_str("\\-->");
        draw_node(out, right, nulls, &format!("{indent}    "));
    }
}
