//! Declaration exported by every compiled build unit.
//!
//! A unit calls [`export_builder!`](crate::export_builder) once; the loader
//! resolves [`BUILDER_SYMBOL`] and refuses declarations built against a
//! different interface.

use crate::Builder;

/// Name of the exported static.
pub const BUILDER_SYMBOL: &str = "XRC_BUILDER";

/// Bumped whenever [`BuilderDeclaration`] or [`Builder`] change shape.
pub const ABI_VERSION: u32 = 1;

/// Version of this crate; host and unit must agree on it.
pub const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");

#[repr(C)]
pub struct BuilderDeclaration {
    pub abi_version: u32,
    pub build_version: &'static str,
    pub create: fn() -> Box<dyn Builder>,
}

impl BuilderDeclaration {
    pub fn is_compatible(&self) -> bool { self.abi_version == ABI_VERSION && self.build_version == BUILD_VERSION }
}

/// Exports `$ctor()` as this unit's builder.
///
/// ```ignore
/// struct Example;
/// impl xrc_build::Builder for Example { /* ... */ }
/// xrc_build::export_builder!(Example::new);
/// ```
#[macro_export]
macro_rules! export_builder {
    ($ctor:path) => {
        #[doc(hidden)]
        fn __xrc_create_builder() -> ::std::boxed::Box<dyn $crate::Builder> {
            ::std::boxed::Box::new($ctor())
        }

        #[allow(unsafe_code)]
        #[no_mangle]
        pub static XRC_BUILDER: $crate::BuilderDeclaration = $crate::BuilderDeclaration {
            abi_version: $crate::ABI_VERSION,
            build_version: $crate::BUILD_VERSION,
            create: __xrc_create_builder,
        };
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CompositionSkeleton, ObjectKindReference};
    use kube::core::GroupVersionKind;

    struct Noop;

    impl Noop {
        fn new() -> Self { Noop }
    }

    impl Builder for Noop {
        fn composite_type_ref(&self) -> ObjectKindReference {
            ObjectKindReference::from_value(GroupVersionKind::gvk("example.io", "v1", "XNoop"), serde_json::json!({}))
        }

        fn build(&self, composition: &mut CompositionSkeleton) -> anyhow::Result<()> {
            composition.with_name("noop");
            Ok(())
        }
    }

    crate::export_builder!(Noop::new);

    #[test]
    fn exported_declaration_creates_the_builder() {
        assert!(XRC_BUILDER.is_compatible());
        let builder = (XRC_BUILDER.create)();
        let mut skeleton = CompositionSkeleton::new(builder.composite_type_ref());
        builder.build(&mut skeleton).unwrap();
        assert_eq!(skeleton.finalize().unwrap().name(), "noop");
    }

    #[test]
    fn mismatched_versions_are_incompatible() {
        let decl = BuilderDeclaration { abi_version: ABI_VERSION + 1, build_version: BUILD_VERSION, create: XRC_BUILDER.create };
        assert!(!decl.is_compatible());
        let decl = BuilderDeclaration { abi_version: ABI_VERSION, build_version: "0.0.0-other", create: XRC_BUILDER.create };
        assert!(!decl.is_compatible());
    }
}
