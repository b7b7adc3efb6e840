//! Watchdog attributes for tests that talk to sockets or spawned tasks.
//!
//! A hung test should fail with "timed out", not wedge the whole suite, so
//! both attributes run the test body on a dedicated thread and give it a
//! bounded number of seconds to report back.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Attribute, ItemFn, LitInt};

const DEFAULT_TIMEOUT_SECS: u64 = 45;

/// Watchdog for async tests. Replaces `#[tokio::test]`: builds a
/// current-thread runtime inside the guarded thread so the timeout covers
/// runtime startup as well as the test body.
///
/// Usage: `#[test_timeout::tokio_timeout_test]` or
/// `#[test_timeout::tokio_timeout_test(10)]` for a tighter bound.
#[proc_macro_attribute]
pub fn tokio_timeout_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let secs = parse_timeout_secs(attr);
    let func = parse_macro_input!(item as ItemFn);

    if func.sig.asyncness.is_none() {
        return syn::Error::new_spanned(
            &func.sig.ident,
            "tokio_timeout_test requires an async fn",
        )
        .to_compile_error()
        .into();
    }

    let body = {
        let block = &func.block;
        quote! {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("tokio runtime for test");
            runtime.block_on(async #block);
        }
    };

    let mut sig = func.sig.clone();
    sig.asyncness = None;
    emit_guarded_test(&func, sig, body, secs, &["tokio", "test"])
}

/// Watchdog for synchronous tests. Replaces `#[test]`.
#[proc_macro_attribute]
pub fn timeout(attr: TokenStream, item: TokenStream) -> TokenStream {
    let secs = parse_timeout_secs(attr);
    let func = parse_macro_input!(item as ItemFn);

    if func.sig.asyncness.is_some() {
        return syn::Error::new_spanned(
            &func.sig.ident,
            "timeout expects a synchronous fn; use tokio_timeout_test for async",
        )
        .to_compile_error()
        .into();
    }

    let block = &func.block;
    let body = quote!( #block );
    let sig = func.sig.clone();
    emit_guarded_test(&func, sig, body, secs, &["test"])
}

fn parse_timeout_secs(attr: TokenStream) -> u64 {
    if attr.is_empty() {
        return DEFAULT_TIMEOUT_SECS;
    }
    let lit: LitInt = syn::parse(attr).expect("timeout argument must be an integer literal");
    let secs: u64 = lit.base10_parse().expect("timeout argument must fit in u64");
    assert!(secs > 0, "timeout of zero seconds is not a watchdog");
    secs
}

fn emit_guarded_test(
    func: &ItemFn,
    sig: syn::Signature,
    body: TokenStream2,
    secs: u64,
    replaced: &[&str],
) -> TokenStream {
    let vis = &func.vis;
    let kept_attrs: Vec<&Attribute> = func
        .attrs
        .iter()
        .filter(|attr| !attr_matches_path(attr, replaced))
        .collect();

    TokenStream::from(quote! {
        #[test]
        #(#kept_attrs)*
        #vis #sig {
            let deadline = std::time::Duration::from_secs(#secs);
            let (done_tx, done_rx) = std::sync::mpsc::channel();
            let worker = std::thread::spawn(move || {
                let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    #body
                }));
                let _ = done_tx.send(outcome);
            });
            match done_rx.recv_timeout(deadline) {
                Ok(Ok(())) => {
                    let _ = worker.join();
                }
                Ok(Err(panic_payload)) => std::panic::resume_unwind(panic_payload),
                Err(_) => panic!("test exceeded {}s watchdog", #secs),
            }
        }
    })
}

fn attr_matches_path(attr: &Attribute, segments: &[&str]) -> bool {
    let path = attr.path();
    path.segments.len() == segments.len()
        && path
            .segments
            .iter()
            .zip(segments)
            .all(|(seg, want)| seg.ident == want)
}
