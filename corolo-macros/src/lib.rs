#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub
)]
#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_variables))
))]

//! Entry-point attributes for corolo.

mod entry;
mod parse;

/// Turns an `async fn` into a synchronous one whose body runs as a task on a
/// fresh `corolo::runtime::Loop`.
///
/// The body is moved into a `Send + 'static` task, so the function can't take
/// arguments.
///
/// # Idle strategy
///
/// When the loop has nothing ready and waits on a delayed handle, it sleeps by
/// default. Select spinning instead with:
///
/// ```rust
/// #[corolo::main(idle = "spin")]
/// # async fn main() {}
/// ```
///
/// # Usage
///
/// ```rust
/// #[corolo::main]
/// async fn main() {
///     println!("Hello world");
/// }
/// ```
///
/// Equivalent code not using `#[corolo::main]`
///
/// ```rust
/// fn main() {
///     corolo::Builder::new().block_on(async {
///         println!("Hello world");
///     })
/// }
/// ```
#[proc_macro_attribute]
pub fn main(
    args: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    entry::main(args.into(), item.into()).into()
}

/// Like [`main`](macro@main), for tests. Each test gets its own loop.
///
/// ```no_run
/// #[corolo::test]
/// async fn my_test() {
///     let task = corolo::Task::new(async { 1 + 1 });
///     assert_eq!(task.await, 2);
/// }
/// ```
///
/// Equivalent code not using `#[corolo::test]`
///
/// ```no_run
/// #[test]
/// fn my_test() {
///     corolo::Builder::new().block_on(async {
///         let task = corolo::Task::new(async { 1 + 1 });
///         assert_eq!(task.await, 2);
///     })
/// }
/// ```
///
/// The idle strategy is set the same way as for `main`:
///
/// ```no_run
/// #[corolo::test(idle = "spin")]
/// async fn my_test() {}
/// ```
#[proc_macro_attribute]
pub fn test(
    args: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    entry::test(args.into(), item.into()).into()
}
