//! Subtype oracle tests: common-superclass walks and the class-info
//! cache's interaction with modified classes.

use reweave_processor::{Error, Processor};
use reweave_tests::{ClassText, FnTransformer, MapPlatform, processor_on, processor_with};
use reweave_tree::{Tree, Value};

fn hierarchy_platform() -> MapPlatform {
    MapPlatform::default()
        .with("java/lang/Object", ClassText::new("java/lang/Object").bytes())
        .with(
            "pkg/Base",
            ClassText::new("pkg/Base")
                .superclass("java/lang/Object")
                .bytes(),
        )
        .with(
            "pkg/A",
            ClassText::new("pkg/A").superclass("pkg/Base").bytes(),
        )
        .with(
            "pkg/B",
            ClassText::new("pkg/B").superclass("pkg/Base").bytes(),
        )
        .with(
            "pkg/X",
            ClassText::new("pkg/X").superclass("java/lang/Object").bytes(),
        )
        .with(
            "pkg/Y",
            ClassText::new("pkg/Y").superclass("java/lang/Object").bytes(),
        )
        .with(
            "pkg/I",
            ClassText::new("pkg/I")
                .superclass("java/lang/Object")
                .interface()
                .bytes(),
        )
}

fn oracle() -> Processor {
    processor_on(hierarchy_platform())
}

#[test]
fn test_common_superclass_of_siblings() {
    let processor = oracle();
    let common = processor
        .common_super_class(Some("pkg/A"), Some("pkg/B"))
        .unwrap();
    assert_eq!(common, "pkg/Base");
}

#[test]
fn test_common_superclass_when_one_dominates() {
    let processor = oracle();
    assert_eq!(
        processor
            .common_super_class(Some("pkg/A"), Some("pkg/Base"))
            .unwrap(),
        "pkg/Base"
    );
    assert_eq!(
        processor
            .common_super_class(Some("pkg/Base"), Some("pkg/A"))
            .unwrap(),
        "pkg/Base"
    );
}

#[test]
fn test_common_superclass_of_unrelated_classes() {
    let processor = oracle();
    let common = processor
        .common_super_class(Some("pkg/X"), Some("pkg/Y"))
        .unwrap();
    assert_eq!(common, "java/lang/Object");
}

#[test]
fn test_common_superclass_with_interface_or_null() {
    let processor = oracle();
    assert_eq!(
        processor
            .common_super_class(Some("pkg/A"), Some("pkg/I"))
            .unwrap(),
        "java/lang/Object"
    );
    assert_eq!(
        processor.common_super_class(None, Some("pkg/A")).unwrap(),
        "java/lang/Object"
    );
}

#[test]
fn test_missing_platform_class_fails() {
    let processor = oracle();
    let result = processor.common_super_class(Some("pkg/Missing"), Some("pkg/A"));
    assert!(matches!(result, Err(Error::TypeNotPresent(_))));
}

/// Writing a class drops its cached header facts, and later queries
/// answer from the modified tree instead of the platform.
#[test]
fn test_modified_class_invalidates_info_cache() {
    // the oracle resolves unmodified classes through the platform, so
    // the surrounding hierarchy rides along
    let mut processor = processor_with(&[
        (
            "pkg/C",
            ClassText::new("pkg/C").superclass("java/lang/Object").bytes(),
        ),
        (
            "java/lang/Object",
            ClassText::new("java/lang/Object").bytes(),
        ),
        (
            "pkg/Base",
            ClassText::new("pkg/Base")
                .superclass("java/lang/Object")
                .bytes(),
        ),
    ]);

    // pre-process: pkg/C extends Object only, and the lookup is cached
    assert_eq!(
        processor
            .common_super_class(Some("pkg/C"), Some("pkg/Base"))
            .unwrap(),
        "java/lang/Object"
    );
    assert!(processor.cached_class_info("pkg/C").is_some());

    processor.add_transformer(Box::new(FnTransformer::new("Retarget").on_read(|p| {
        p.with_class("pkg/C", |p, class| {
            let target = p.ref_capture(class.superclass())?;
            p.add_write("Retarget", &target, |ctx| {
                Ok(Tree::scalar(Value::from("pkg/Base"), ctx.gate())?)
            })
        })
    })));
    processor.process().unwrap();

    // the written class is gone from the cache...
    assert!(processor.cached_class_info("pkg/C").is_none());
    // ...and the oracle now reads the live modified tree
    assert_eq!(
        processor
            .common_super_class(Some("pkg/C"), Some("pkg/Base"))
            .unwrap(),
        "pkg/Base"
    );
}
