//! End-to-end tests for the full phase engine:
//! apply -> rounds -> parallel read -> class-request fixpoint -> write.

use std::sync::{Arc, Mutex};

use reweave_processor::{Error, NodeCapture};
use reweave_tests::{ClassText, FnTransformer, processor_with};
use reweave_tree::{NodeTag, Tree, TreeError, Value};

/// A copy capture snapshots at construction; a reference capture sees
/// the write. Both transformers run in the same round.
#[test]
fn test_copy_capture_survives_reference_write() {
    let class = ClassText::new("pkg/C")
        .superclass("java/lang/Object")
        .method("target", "()V")
        .bytes();
    let mut processor = processor_with(&[("pkg/C", class)]);

    let copied: Arc<Mutex<Option<NodeCapture>>> = Arc::new(Mutex::new(None));
    let copied_hook = copied.clone();
    processor.add_transformer(Box::new(FnTransformer::new("Observer").on_read(move |p| {
        let copied = copied_hook.clone();
        p.with_class("pkg/C", move |p, class| {
            let name = class.methods().child(0).unwrap().name();
            *copied.lock().unwrap() = Some(p.copy_capture(name)?);
            Ok(())
        })
    })));
    processor.add_transformer(Box::new(FnTransformer::new("Renamer").on_read(|p| {
        p.with_class("pkg/C", |p, class| {
            let name = class.methods().child(0).unwrap().name();
            let target = p.ref_capture(name)?;
            p.add_write("Renamer", &target, |ctx| {
                Ok(Tree::scalar(Value::from("renamed"), ctx.gate())?)
            })
        })
    })));

    processor.process().unwrap();

    let modified: Vec<&str> = processor.modified_class_names().collect();
    assert_eq!(modified, ["pkg/C"]);

    let tree = processor.find_class_immediately("pkg/C").unwrap().unwrap();
    let tree = tree.read().unwrap();
    assert_eq!(
        tree.root_ref().methods().child(0).unwrap().name().as_str(),
        Some("renamed")
    );

    let copied = copied.lock().unwrap();
    let snapshot = copied.as_ref().unwrap().snapshot().unwrap();
    assert_eq!(snapshot.root_ref().as_str(), Some("target"));
}

/// Slice `[1, 3)` of `[10, 20, 30, 40]` replaced by `[100, 200, 300]`
/// yields `[10, 100, 200, 300, 40]`.
#[test]
fn test_slice_replacement() {
    let class = ClassText::new("pkg/L")
        .superclass("java/lang/Object")
        .modifier(10)
        .modifier(20)
        .modifier(30)
        .modifier(40)
        .bytes();
    let mut processor = processor_with(&[("pkg/L", class)]);

    processor.add_transformer(Box::new(FnTransformer::new("Splicer").on_read(|p| {
        p.with_class("pkg/L", |p, class| {
            let target = p.ref_slice(class.modifiers(), 1, 3, true, false)?;
            p.add_slice_write("Splicer", &target, |ctx| {
                let mut list = Tree::new_list(NodeTag::Value, ctx.gate())?;
                let root = list.root();
                for value in [100, 200, 300] {
                    list.append_value(root, Value::Int(value))?;
                }
                Ok(list)
            })
        })
    })));

    processor.process().unwrap();

    let tree = processor.find_class_immediately("pkg/L").unwrap().unwrap();
    let tree = tree.read().unwrap();
    let modifiers: Vec<i64> = tree
        .root_ref()
        .modifiers()
        .children()
        .map(|m| m.as_int().unwrap())
        .collect();
    assert_eq!(modifiers, [10, 100, 200, 300, 40]);
}

/// A callback for class A requests B, whose callback requests C; all
/// three run before the write phase of the round.
#[test]
fn test_class_request_fixpoint() {
    let classes = [
        ("pkg/A", ClassText::new("pkg/A").bytes()),
        ("pkg/B", ClassText::new("pkg/B").bytes()),
        ("pkg/C", ClassText::new("pkg/C").bytes()),
    ];
    let mut processor = processor_with(&classes);

    let visited: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let visited_hook = visited.clone();
    processor.add_transformer(Box::new(FnTransformer::new("Chaser").on_read(move |p| {
        let visited = visited_hook.clone();
        p.with_class("pkg/A", move |p, class| {
            visited
                .lock()
                .unwrap()
                .push(class.name().as_str().unwrap().to_string());
            let visited_b = visited.clone();
            p.with_class("pkg/B", move |p, class| {
                visited_b
                    .lock()
                    .unwrap()
                    .push(class.name().as_str().unwrap().to_string());
                let visited_c = visited_b.clone();
                p.with_class("pkg/C", move |_, class| {
                    visited_c
                        .lock()
                        .unwrap()
                        .push(class.name().as_str().unwrap().to_string());
                    Ok(())
                })
            })
        })
    })));

    processor.process().unwrap();

    assert_eq!(*visited.lock().unwrap(), ["pkg/A", "pkg/B", "pkg/C"]);
    assert_eq!(processor.modified_class_names().count(), 0);
}

/// Mutually dependent transformers cannot be scheduled.
#[test]
fn test_cyclic_round_dependencies_fail() {
    let mut processor = processor_with(&[]);
    processor.invalidate_cache();

    processor.add_transformer(Box::new(
        FnTransformer::new("A")
            .on_apply(|p| p.add_round_dependency("A", "B"))
            .on_read(|_| Ok(())),
    ));
    processor.add_transformer(Box::new(
        FnTransformer::new("B")
            .on_apply(|p| p.add_round_dependency("B", "A"))
            .on_read(|_| Ok(())),
    ));

    let result = processor.process();
    assert!(matches!(result, Err(Error::CyclicDependency { .. })));
}

/// `process()` marks the inputs up to date; running it again does
/// nothing.
#[test]
fn test_reprocess_is_noop() {
    let class = ClassText::new("pkg/A").bytes();
    let mut processor = processor_with(&[("pkg/A", class)]);

    let reads = Arc::new(Mutex::new(0usize));
    let reads_hook = reads.clone();
    processor.add_transformer(Box::new(FnTransformer::new("Counter").on_read(move |_| {
        *reads_hook.lock().unwrap() += 1;
        Ok(())
    })));

    assert!(!processor.is_up_to_date());
    processor.process().unwrap();
    assert!(processor.is_up_to_date());
    assert_eq!(*reads.lock().unwrap(), 1);

    processor.process().unwrap();
    assert_eq!(*reads.lock().unwrap(), 1);
}

/// A transformer in a later round observes the previous round's writes.
#[test]
fn test_later_round_sees_earlier_writes() {
    let class = ClassText::new("pkg/C")
        .superclass("java/lang/Object")
        .method("original", "()V")
        .bytes();
    let mut processor = processor_with(&[("pkg/C", class)]);

    processor.add_transformer(Box::new(FnTransformer::new("First").on_read(|p| {
        p.with_class("pkg/C", |p, class| {
            let target = p.ref_capture(class.methods().child(0).unwrap().name())?;
            p.add_write("First", &target, |ctx| {
                Ok(Tree::scalar(Value::from("stage1"), ctx.gate())?)
            })
        })
    })));

    let observed: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let observed_hook = observed.clone();
    processor.add_transformer(Box::new(
        FnTransformer::new("Second")
            .on_apply(|p| p.add_round_dependency("Second", "First"))
            .on_read(move |p| {
                let observed = observed_hook.clone();
                p.with_class("pkg/C", move |_, class| {
                    let name = class.methods().child(0).unwrap().name();
                    *observed.lock().unwrap() = name.as_str().map(str::to_string);
                    Ok(())
                })
            }),
    ));

    processor.process().unwrap();

    assert_eq!(observed.lock().unwrap().as_deref(), Some("stage1"));
}

/// Write dependencies order writes within a class regardless of
/// registration order; the later writer wins on the shared target.
#[test]
fn test_write_dependency_orders_writes() {
    let class = ClassText::new("pkg/C")
        .superclass("java/lang/Object")
        .method("original", "()V")
        .bytes();
    let mut processor = processor_with(&[("pkg/C", class)]);

    // registered first so its write tends to be submitted first
    processor.add_transformer(Box::new(
        FnTransformer::new("Late")
            .on_apply(|p| p.add_write_dependency("Late", "Early"))
            .on_read(|p| {
                p.with_class("pkg/C", |p, class| {
                    let target = p.ref_capture(class.methods().child(0).unwrap().name())?;
                    p.add_write("Late", &target, |ctx| {
                        Ok(Tree::scalar(Value::from("late"), ctx.gate())?)
                    })
                })
            }),
    ));
    processor.add_transformer(Box::new(FnTransformer::new("Early").on_read(|p| {
        p.with_class("pkg/C", |p, class| {
            let target = p.ref_capture(class.methods().child(0).unwrap().name())?;
            p.add_write("Early", &target, |ctx| {
                Ok(Tree::scalar(Value::from("early"), ctx.gate())?)
            })
        })
    })));

    processor.process().unwrap();

    let tree = processor.find_class_immediately("pkg/C").unwrap().unwrap();
    let tree = tree.read().unwrap();
    assert_eq!(
        tree.root_ref().methods().child(0).unwrap().name().as_str(),
        Some("late")
    );
}

/// A slice write whose resolved range an earlier write invalidated
/// fails fast instead of splicing a wrong region.
#[test]
fn test_stale_slice_range_fails_fast() {
    let class = ClassText::new("pkg/L")
        .modifier(1)
        .modifier(2)
        .modifier(3)
        .modifier(4)
        .bytes();
    let mut processor = processor_with(&[("pkg/L", class)]);

    processor.add_transformer(Box::new(FnTransformer::new("Clobber").on_read(|p| {
        p.with_class("pkg/L", |p, class| {
            let whole = p.ref_slice(class.modifiers(), 0, 4, true, false)?;
            p.add_slice_write("Clobber", &whole, |ctx| {
                Ok(Tree::new_list(NodeTag::Value, ctx.gate())?)
            })?;
            let inner = p.ref_slice(class.modifiers(), 1, 3, true, false)?;
            p.add_slice_write("Clobber", &inner, |ctx| {
                Ok(Tree::new_list(NodeTag::Value, ctx.gate())?)
            })
        })
    })));

    let result = processor.process();
    assert!(matches!(
        result,
        Err(Error::Tree(TreeError::InvalidRange { .. }))
    ));
}

/// Predicate and prefix selection enqueue one callback per matching
/// class.
#[test]
fn test_with_classes_selection() {
    let classes = [
        ("pkg/A", ClassText::new("pkg/A").bytes()),
        ("pkg/B", ClassText::new("pkg/B").bytes()),
        ("other/C", ClassText::new("other/C").bytes()),
    ];
    let mut processor = processor_with(&classes);

    let prefixed = Arc::new(Mutex::new(0usize));
    let all = Arc::new(Mutex::new(0usize));
    let prefixed_hook = prefixed.clone();
    let all_hook = all.clone();
    processor.add_transformer(Box::new(FnTransformer::new("Selector").on_read(move |p| {
        let prefixed = prefixed_hook.clone();
        p.with_classes_prefixed("pkg/", move |_, _| {
            *prefixed.lock().unwrap() += 1;
            Ok(())
        })?;
        let all = all_hook.clone();
        p.with_all_classes(move |_, _| {
            *all.lock().unwrap() += 1;
            Ok(())
        })
    })));

    processor.process().unwrap();

    assert_eq!(*prefixed.lock().unwrap(), 2);
    assert_eq!(*all.lock().unwrap(), 3);
}

/// Unknown class names are rejected at request time.
#[test]
fn test_with_class_unknown_is_an_error() {
    let mut processor = processor_with(&[("pkg/A", ClassText::new("pkg/A").bytes())]);
    processor.add_transformer(Box::new(FnTransformer::new("Lost").on_read(|p| {
        p.with_class("pkg/Missing", |_, _| Ok(()))
    })));
    let result = processor.process();
    assert!(matches!(result, Err(Error::UnknownClass(name)) if name == "pkg/Missing"));
}

/// Read-phase operations invoked from the apply hook are phase errors.
#[test]
fn test_read_operation_in_apply_phase_fails() {
    let mut processor = processor_with(&[("pkg/A", ClassText::new("pkg/A").bytes())]);
    processor.add_transformer(Box::new(
        FnTransformer::new("Eager")
            .on_apply(|p| p.with_class("pkg/A", |_, _| Ok(())))
            .on_read(|_| Ok(())),
    ));
    let result = processor.process();
    assert!(matches!(result, Err(Error::PhaseViolation { .. })));
}
