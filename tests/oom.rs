//! Allocation failure while inserting. Lives in its own test binary because
//! it installs a global allocator that can be told to fail.

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;
use std::mem;
use std::ptr;

use avl_engine::shell::Shell;
use avl_engine::{AvlTree, Error};

#[derive(Clone, Copy)]
enum Armed {
    Off,
    /// Fail the next allocation, whatever its layout
    Next,
    /// Fail the next allocation of this size with pointer alignment
    Size(usize),
}

thread_local! {
    static ARMED: Cell<Armed> = const { Cell::new(Armed::Off) };
}

struct FailingAllocator;

impl FailingAllocator {
    fn take_failure(layout: Layout) -> bool {
        ARMED
            .try_with(|armed| {
                let fail = match armed.get() {
                    Armed::Off => false,
                    Armed::Next => true,
                    Armed::Size(size) => {
                        layout.size() == size && layout.align() == mem::align_of::<usize>()
                    }
                };
                if fail {
                    armed.set(Armed::Off);
                }
                fail
            })
            .unwrap_or(false)
    }
}

unsafe impl GlobalAlloc for FailingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if Self::take_failure(layout) {
            return ptr::null_mut();
        }
        System.alloc(layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout)
    }
}

#[global_allocator]
static ALLOCATOR: FailingAllocator = FailingAllocator;

fn tree_of_range() -> AvlTree<i32> {
    let mut tree = AvlTree::new();
    for key in 1..=7 {
        tree.insert(key).unwrap();
    }
    tree
}

/// Fails the node allocation of one insert and returns the reported size.
fn failed_insert_size(tree: &mut AvlTree<i32>, key: i32) -> usize {
    ARMED.with(|armed| armed.set(Armed::Next));
    let result = tree.insert(key);
    ARMED.with(|armed| armed.set(Armed::Off));
    match result {
        Err(Error::OutOfMemory { size }) => size,
        other => panic!("expected OutOfMemory, got {other:?}"),
    }
}

#[test]
fn test_insert_out_of_memory_keeps_tree() {
    let mut tree = tree_of_range();
    let before: Vec<i32> = tree.preorder().copied().collect();

    let size = failed_insert_size(&mut tree, 100);
    assert!(size >= mem::size_of::<i32>() + 3 * mem::size_of::<usize>());

    assert_eq!(tree.len(), 7);
    assert!(!tree.contains(&100));
    assert_eq!(tree.preorder().copied().collect::<Vec<_>>(), before);

    // Memory is back, the same insert goes through
    assert_eq!(tree.insert(100), Ok(true));
    assert_eq!(tree.len(), 8);
}

#[test]
fn test_shell_reports_out_of_memory_and_continues() {
    let size = failed_insert_size(&mut AvlTree::new(), 1);

    let mut shell = Shell::new("1 100 3 1 100 3 4".as_bytes(), Vec::new(), true);
    for key in 1..=7 {
        shell.tree_mut().insert(key).unwrap();
    }

    // Only node allocations have this layout, strings and the token queue do not
    ARMED.with(|armed| armed.set(Armed::Size(size)));
    shell.run().unwrap();
    ARMED.with(|armed| armed.set(Armed::Off));

    let output = String::from_utf8(shell.into_output()).unwrap();
    assert_eq!(
        output,
        format!(
            "{}\n4 2 1 3 6 5 7 \n4 2 1 3 6 5 7 100 \n",
            Error::OutOfMemory { size }
        )
    );
}
