use std::alloc::{self, Layout};
use std::cmp::{self, Ordering};
use std::fmt;
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::ptr::NonNull;

use log::{debug, trace};

use crate::error::Error;

/// An AVL tree of unique keys.
///
/// Every structural change is done recursively: each step returns the new
/// root of the subtree it worked on and the caller stores it back into its
/// own link.
///
/// ```
/// use avl_engine::AvlTree;
/// let mut tree = AvlTree::new();
/// for key in [10, 20, 30] {
///     tree.insert(key).unwrap();
/// }
/// assert_eq!(tree.preorder().copied().collect::<Vec<_>>(), [20, 10, 30]);
/// assert!(tree.remove(&20));
/// assert!(!tree.contains(&20));
/// ```
pub struct AvlTree<K: Ord> {
    root: Link<K>,
    num_nodes: usize,
    marker: PhantomData<Box<Node<K>>>,
}

struct Node<K> {
    key: K,
    left: Link<K>,
    right: Link<K>,
    height: usize,
}

type NodePtr<K> = NonNull<Node<K>>;
type Link<K> = Option<NodePtr<K>>;

/// A pre-order iterator over the keys of a tree.
///
/// This `struct` is created by the [`preorder`] method on [`AvlTree`].
///
/// [`AvlTree`]: struct.AvlTree.html
/// [`preorder`]: struct.AvlTree.html#method.preorder
pub struct Preorder<'a, K> {
    stack: Vec<NodePtr<K>>,
    remaining: usize,
    marker: PhantomData<&'a Node<K>>,
}

impl<K: Ord> AvlTree<K> {
    /// Creates an empty tree.
    /// No memory is allocated until the first key is inserted.
    pub fn new() -> Self {
        Self {
            root: None,
            num_nodes: 0,
            marker: PhantomData,
        }
    }

    /// Returns true if the tree contains no keys.
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Returns the number of keys in the tree.
    pub fn len(&self) -> usize {
        self.num_nodes
    }

    /// Returns the height of the tree: 0 when empty, 1 for a single leaf.
    pub fn height(&self) -> usize {
        Self::height_of(self.root)
    }

    /// Clears the tree, deallocating all nodes.
    pub fn clear(&mut self) {
        if let Some(root_ptr) = self.root.take() {
            unsafe { Node::destroy_subtree(root_ptr) };
        }
        self.num_nodes = 0;
    }

    /// Returns true if the tree contains the key.
    pub fn contains(&self, key: &K) -> bool {
        let mut current = self.root;
        while let Some(node_ptr) = current {
            current = unsafe {
                match key.cmp(&node_ptr.as_ref().key) {
                    Ordering::Equal => return true,
                    Ordering::Less => node_ptr.as_ref().left,
                    Ordering::Greater => node_ptr.as_ref().right,
                }
            }
        }
        false
    }

    /// Returns the smallest key in the tree.
    pub fn first(&self) -> Option<&K> {
        self.root
            .map(|root_ptr| &unsafe { &*Self::min_value_node(root_ptr).as_ptr() }.key)
    }

    /// Inserts a key into the tree.
    /// Returns `Ok(false)` and leaves the tree untouched if the key is already present.
    ///
    /// If no memory can be allocated for the new node, `Error::OutOfMemory` is
    /// returned and the tree is unchanged.
    pub fn insert(&mut self, key: K) -> Result<bool, Error> {
        let (root_ptr, inserted) = unsafe { Self::insert_at(self.root, key)? };
        self.root = Some(root_ptr);
        if inserted.is_none() {
            debug!("Duplicate key ignored");
            return Ok(false);
        }
        self.num_nodes += 1;
        debug!("Inserted key, tree holds {} nodes", self.num_nodes);
        Ok(true)
    }

    /// Removes a key from the tree.
    /// Returns whether the key was previously in the tree.
    pub fn remove(&mut self, key: &K) -> bool {
        let (root, removed) = unsafe { Self::remove_at(self.root, key) };
        self.root = root;
        if !removed {
            debug!("Key to remove not found");
            return false;
        }
        debug_assert!(self.num_nodes >= 1);
        self.num_nodes -= 1;
        debug!("Removed key, tree holds {} nodes", self.num_nodes);
        true
    }

    /// Gets a pre-order iterator over the keys: node first, then its left
    /// subtree, then its right subtree.
    pub fn preorder(&self) -> Preorder<'_, K> {
        let mut stack = Vec::with_capacity(self.height());
        stack.extend(self.root);
        Preorder {
            stack,
            remaining: self.num_nodes,
            marker: PhantomData,
        }
    }

    /// Asserts the ordering, height and balance invariants of every node
    /// and the node count.
    #[cfg(any(test, feature = "consistency_check"))]
    pub fn check_consistency(&self) {
        let num_nodes = unsafe { Self::check_subtree(self.root, None, None) };
        assert_eq!(num_nodes, self.num_nodes);
    }

    #[cfg(test)]
    pub(crate) fn inorder(&self) -> Vec<&K> {
        fn walk<'a, K>(link: Link<K>, keys: &mut Vec<&'a K>) {
            if let Some(node_ptr) = link {
                let node: &'a Node<K> = unsafe { &*node_ptr.as_ptr() };
                walk(node.left, keys);
                keys.push(&node.key);
                walk(node.right, keys);
            }
        }
        let mut keys = Vec::with_capacity(self.num_nodes);
        walk(self.root, &mut keys);
        keys
    }

    #[cfg(any(test, feature = "consistency_check"))]
    unsafe fn check_subtree<'a>(link: Link<K>, lower: Option<&'a K>, upper: Option<&'a K>) -> usize {
        let node: &'a Node<K> = match link {
            None => return 0,
            Some(node_ptr) => &*node_ptr.as_ptr(),
        };

        // Check key against every ancestor bound, not only the parent
        if let Some(lower) = lower {
            assert!(*lower < node.key);
        }
        if let Some(upper) = upper {
            assert!(node.key < *upper);
        }

        // Check height
        let left_height = Self::height_of(node.left);
        let right_height = Self::height_of(node.right);
        assert_eq!(node.height, 1 + cmp::max(left_height, right_height));

        // Check AVL condition (nearly balance)
        assert!(left_height <= right_height + 1);
        assert!(right_height <= left_height + 1);

        1 + Self::check_subtree(node.left, lower, Some(&node.key))
            + Self::check_subtree(node.right, Some(&node.key), upper)
    }

    /// Inserts `key` into the subtree at `link`.
    /// Returns the new subtree root and the created node, which is `None` for
    /// a duplicate key. Nothing is modified before the new node is allocated,
    /// so an allocation error leaves the subtree as it was.
    unsafe fn insert_at(link: Link<K>, key: K) -> Result<(NodePtr<K>, Link<K>), Error> {
        let mut node_ptr = match link {
            None => {
                let leaf_ptr = Node::create(key)?;
                return Ok((leaf_ptr, Some(leaf_ptr)));
            }
            Some(node_ptr) => node_ptr,
        };

        let inserted = match key.cmp(&node_ptr.as_ref().key) {
            Ordering::Equal => return Ok((node_ptr, None)),
            Ordering::Less => {
                let (left_ptr, inserted) = Self::insert_at(node_ptr.as_ref().left, key)?;
                node_ptr.as_mut().left = Some(left_ptr);
                inserted
            }
            Ordering::Greater => {
                let (right_ptr, inserted) = Self::insert_at(node_ptr.as_ref().right, key)?;
                node_ptr.as_mut().right = Some(right_ptr);
                inserted
            }
        };

        // Subtree untouched by a duplicate, heights are still valid
        let Some(inserted_ptr) = inserted else {
            return Ok((node_ptr, None));
        };

        Self::adjust_height(node_ptr);
        Ok((Self::rebalance_after_insert(node_ptr, inserted_ptr), Some(inserted_ptr)))
    }

    /// Restores balance at `node_ptr` after `inserted_ptr` was added below it.
    /// Single or double rotation is chosen by comparing the inserted key with
    /// the key of the heavy child.
    unsafe fn rebalance_after_insert(mut node_ptr: NodePtr<K>, inserted_ptr: NodePtr<K>) -> NodePtr<K> {
        let balance = Self::balance_factor(Some(node_ptr));
        if balance > 1 {
            if let Some(left_ptr) = node_ptr.as_ref().left {
                let order = inserted_ptr.as_ref().key.cmp(&left_ptr.as_ref().key);
                debug_assert!(order != Ordering::Equal, "inserted node is never the heavy child");
                // Left-right
                if order == Ordering::Greater {
                    node_ptr.as_mut().left = Some(Self::rotate_left(left_ptr));
                }
            }
            // Left-left
            return Self::rotate_right(node_ptr);
        }
        if balance < -1 {
            if let Some(right_ptr) = node_ptr.as_ref().right {
                let order = inserted_ptr.as_ref().key.cmp(&right_ptr.as_ref().key);
                debug_assert!(order != Ordering::Equal, "inserted node is never the heavy child");
                // Right-left
                if order == Ordering::Less {
                    node_ptr.as_mut().right = Some(Self::rotate_right(right_ptr));
                }
            }
            // Right-right
            return Self::rotate_left(node_ptr);
        }
        node_ptr
    }

    /// Removes `key` from the subtree at `link`.
    /// Returns the new subtree root and whether a node was removed.
    unsafe fn remove_at(link: Link<K>, key: &K) -> (Link<K>, bool) {
        let Some(mut node_ptr) = link else {
            return (None, false);
        };

        match key.cmp(&node_ptr.as_ref().key) {
            Ordering::Less => {
                let (left, removed) = Self::remove_at(node_ptr.as_ref().left, key);
                node_ptr.as_mut().left = left;
                if !removed {
                    return (Some(node_ptr), false);
                }
            }
            Ordering::Greater => {
                let (right, removed) = Self::remove_at(node_ptr.as_ref().right, key);
                node_ptr.as_mut().right = right;
                if !removed {
                    return (Some(node_ptr), false);
                }
            }
            Ordering::Equal => match (node_ptr.as_ref().left, node_ptr.as_ref().right) {
                (Some(_), Some(right_ptr)) => {
                    // Replace key by in-order successor, which is unlinked from the right subtree
                    let successor_ptr = Self::min_value_node(right_ptr);
                    let (right, min_ptr) = Self::unlink_min(right_ptr);
                    debug_assert!(min_ptr == successor_ptr);
                    node_ptr.as_mut().right = right;
                    node_ptr.as_mut().key = Node::into_key(min_ptr);
                }
                (child, None) | (None, child) => {
                    // Stem or leaf, parent link goes straight to the child
                    Node::destroy(node_ptr);
                    return (child, true);
                }
            },
        }

        Self::adjust_height(node_ptr);
        (Some(Self::rebalance_after_remove(node_ptr)), true)
    }

    /// Detaches the node holding the smallest key of the subtree, rebalancing
    /// on the way back up. Returns the new subtree root and the detached node.
    unsafe fn unlink_min(mut node_ptr: NodePtr<K>) -> (Link<K>, NodePtr<K>) {
        match node_ptr.as_ref().left {
            None => {
                let right = node_ptr.as_ref().right;
                node_ptr.as_mut().right = None;
                (right, node_ptr)
            }
            Some(left_ptr) => {
                let (left, min_ptr) = Self::unlink_min(left_ptr);
                node_ptr.as_mut().left = left;
                Self::adjust_height(node_ptr);
                (Some(Self::rebalance_after_remove(node_ptr)), min_ptr)
            }
        }
    }

    /// Restores balance at `node_ptr` after a removal below it.
    /// Single or double rotation is chosen by the balance of the heavy child.
    unsafe fn rebalance_after_remove(mut node_ptr: NodePtr<K>) -> NodePtr<K> {
        let balance = Self::balance_factor(Some(node_ptr));
        if balance > 1 {
            if let Some(left_ptr) = node_ptr.as_ref().left {
                if Self::balance_factor(Some(left_ptr)) < 0 {
                    node_ptr.as_mut().left = Some(Self::rotate_left(left_ptr));
                }
            }
            return Self::rotate_right(node_ptr);
        }
        if balance < -1 {
            if let Some(right_ptr) = node_ptr.as_ref().right {
                if Self::balance_factor(Some(right_ptr)) > 0 {
                    node_ptr.as_mut().right = Some(Self::rotate_right(right_ptr));
                }
            }
            return Self::rotate_left(node_ptr);
        }
        node_ptr
    }

    unsafe fn min_value_node(mut node_ptr: NodePtr<K>) -> NodePtr<K> {
        while let Some(left_ptr) = node_ptr.as_ref().left {
            node_ptr = left_ptr;
        }
        node_ptr
    }

    fn height_of(link: Link<K>) -> usize {
        match link {
            None => 0,
            Some(node_ptr) => unsafe { node_ptr.as_ref().height },
        }
    }

    fn balance_factor(link: Link<K>) -> isize {
        match link {
            None => 0,
            Some(node_ptr) => unsafe {
                Self::height_of(node_ptr.as_ref().left) as isize
                    - Self::height_of(node_ptr.as_ref().right) as isize
            },
        }
    }

    fn adjust_height(mut node_ptr: NodePtr<K>) {
        unsafe {
            node_ptr.as_mut().height = 1 + cmp::max(
                Self::height_of(node_ptr.as_ref().left),
                Self::height_of(node_ptr.as_ref().right),
            );
        }
    }

    /// Promotes the left child of `node_ptr` and returns it as the new subtree root.
    unsafe fn rotate_right(mut node_ptr: NodePtr<K>) -> NodePtr<K> {
        debug_assert!(node_ptr.as_ref().left.is_some(), "right rotation needs a left child");
        let Some(mut left_ptr) = node_ptr.as_ref().left else {
            return node_ptr;
        };
        node_ptr.as_mut().left = left_ptr.as_ref().right;
        left_ptr.as_mut().right = Some(node_ptr);

        // Child first, new subtree root depends on it
        Self::adjust_height(node_ptr);
        Self::adjust_height(left_ptr);
        trace!("Rotated right, subtree height now {}", left_ptr.as_ref().height);
        left_ptr
    }

    /// Promotes the right child of `node_ptr` and returns it as the new subtree root.
    unsafe fn rotate_left(mut node_ptr: NodePtr<K>) -> NodePtr<K> {
        debug_assert!(node_ptr.as_ref().right.is_some(), "left rotation needs a right child");
        let Some(mut right_ptr) = node_ptr.as_ref().right else {
            return node_ptr;
        };
        node_ptr.as_mut().right = right_ptr.as_ref().left;
        right_ptr.as_mut().left = Some(node_ptr);

        Self::adjust_height(node_ptr);
        Self::adjust_height(right_ptr);
        trace!("Rotated left, subtree height now {}", right_ptr.as_ref().height);
        right_ptr
    }
}

impl<K: Ord> Drop for AvlTree<K> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<K: Ord> Default for AvlTree<K> {
    /// Creates an empty tree.
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + fmt::Debug> fmt::Debug for AvlTree<K> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_list().entries(self.preorder()).finish()
    }
}

// The tree owns its nodes exclusively, like a Box would
unsafe impl<K: Ord + Send> Send for AvlTree<K> {}
unsafe impl<K: Ord + Sync> Sync for AvlTree<K> {}

impl<'a, K> Iterator for Preorder<'a, K> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        let node_ptr = self.stack.pop()?;
        let node: &'a Node<K> = unsafe { &*node_ptr.as_ptr() };
        // Right first, so that the left subtree is popped next
        self.stack.extend(node.right);
        self.stack.extend(node.left);
        self.remaining -= 1;
        Some(&node.key)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K> ExactSizeIterator for Preorder<'_, K> {}

impl<K> FusedIterator for Preorder<'_, K> {}

// Auto derived clone would require K: Clone
impl<K> Clone for Preorder<'_, K> {
    fn clone(&self) -> Self {
        Self {
            stack: self.stack.clone(),
            remaining: self.remaining,
            marker: PhantomData,
        }
    }
}

impl<K: fmt::Debug> fmt::Debug for Preorder<'_, K> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(self.clone()).finish()
    }
}

unsafe impl<K: Sync> Send for Preorder<'_, K> {}
unsafe impl<K: Sync> Sync for Preorder<'_, K> {}

impl<K> Node<K> {
    fn create(key: K) -> Result<NodePtr<K>, Error> {
        // Node<K> is never zero-sized, it always carries links and height
        let layout = Layout::new::<Node<K>>();
        let raw = unsafe { alloc::alloc(layout) }.cast::<Node<K>>();
        let node_ptr = NodePtr::new(raw).ok_or(Error::OutOfMemory {
            size: layout.size(),
        })?;
        unsafe {
            node_ptr.as_ptr().write(Node {
                key,
                left: None,
                right: None,
                height: 1,
            });
        }
        Ok(node_ptr)
    }

    /// Deallocates a detached node and hands back its key.
    unsafe fn into_key(node_ptr: NodePtr<K>) -> K {
        let node = Box::from_raw(node_ptr.as_ptr());
        node.key
    }

    unsafe fn destroy(node_ptr: NodePtr<K>) {
        drop(Box::from_raw(node_ptr.as_ptr()));
    }

    unsafe fn destroy_subtree(node_ptr: NodePtr<K>) {
        let node = Box::from_raw(node_ptr.as_ptr());
        if let Some(left_ptr) = node.left {
            Self::destroy_subtree(left_ptr);
        }
        if let Some(right_ptr) = node.right {
            Self::destroy_subtree(right_ptr);
        }
    }
}
