//! Helper macros for ABI function generation.

/// Generate an exported `extern "C"` function.
///
/// ```ignore
/// abi_fn! {
///     /// Doc comment for the function.
///     fn my_func(arg1: Type1, arg2: Type2) -> ReturnType {
///         // implementation body
///     }
/// }
/// ```
///
/// Expands to a `#[unsafe(no_mangle)] pub unsafe extern "C" fn` whose body
/// runs inside one `unsafe` block.
macro_rules! abi_fn {
    (
        $(#[$meta:meta])*
        fn $name:ident( $($arg:ident : $argty:ty),* $(,)? ) -> $ret:ty
        $body:block
    ) => {
        $(#[$meta])*
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $name( $($arg : $argty),* ) -> $ret {
            #[allow(unused_unsafe)]
            unsafe { $body }
        }
    };

    // Variant without return type (returns ())
    (
        $(#[$meta:meta])*
        fn $name:ident( $($arg:ident : $argty:ty),* $(,)? )
        $body:block
    ) => {
        $(#[$meta])*
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $name( $($arg : $argty),* ) {
            #[allow(unused_unsafe)]
            unsafe { $body }
        }
    };
}

/// Export the four entry points under an engine-specific prefix, each
/// pinned to one [`EngineKind`](arenalloc_core::EngineKind).
macro_rules! engine_entry_points {
    ($kind:expr => $create:ident, $alloc:ident, $free:ident, $destroy:ident) => {
        abi_fn! {
            /// `allocator_create` pinned to one engine.
            fn $create(memory: *mut c_void, size: usize) -> *mut Allocator {
                create_arena($kind, memory, size)
            }
        }

        abi_fn! {
            /// `allocator_alloc` that refuses arenas of the other engine.
            fn $alloc(allocator: *mut Allocator, size: usize) -> *mut c_void {
                alloc_from(allocator, Some($kind), size)
            }
        }

        abi_fn! {
            /// `allocator_free` that ignores arenas of the other engine.
            fn $free(allocator: *mut Allocator, memory: *mut c_void) {
                free_into(allocator, Some($kind), memory)
            }
        }

        abi_fn! {
            /// `allocator_destroy` that ignores arenas of the other engine.
            fn $destroy(allocator: *mut Allocator) {
                destroy_arena(allocator, Some($kind))
            }
        }
    };
}

pub(crate) use abi_fn;
pub(crate) use engine_entry_points;
