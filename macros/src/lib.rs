use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::{parse_macro_input, spanned::Spanned, Ident, ItemFn, LitStr};

const USAGE: &str = "rxmulti_macro::test only accepts: #[rxmulti_macro::test], \
                     #[rxmulti_macro::test(current)], #[rxmulti_macro::test(shared)], or string \
                     equivalents";

/// Marks a test function.
///
/// Sync functions become plain `#[test]`s. Async functions run on a tokio
/// runtime: `current` (the default) uses a current-thread runtime, `shared`
/// a multi-threaded one, for streams hopping between threads.
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
  let input = parse_macro_input!(item as ItemFn);
  let raw_args = proc_macro2::TokenStream::from(attr);

  if input.sig.asyncness.is_none() {
    if !raw_args.is_empty() {
      return error(
        raw_args.span(),
        "rxmulti_macro::test runtime args are only supported for async tests. Use \
         #[rxmulti_macro::test] for sync tests, or make the function async.",
      );
    }
    return TokenStream::from(quote! {
        #[test]
        #input
    });
  }

  let flavor = if raw_args.is_empty() {
    Ok(quote!(flavor = "current_thread"))
  } else if let Ok(ident) = syn::parse2::<Ident>(raw_args.clone()) {
    flavor(&ident.to_string(), ident.span())
  } else if let Ok(lit) = syn::parse2::<LitStr>(raw_args.clone()) {
    flavor(&lit.value(), lit.span())
  } else {
    Err(error(raw_args.span(), USAGE))
  };

  match flavor {
    Ok(flavor) => TokenStream::from(quote! {
        #[tokio::test(#flavor)]
        #input
    }),
    Err(err) => err,
  }
}

fn flavor(name: &str, span: Span) -> Result<proc_macro2::TokenStream, TokenStream> {
  match name {
    "current" => Ok(quote!(flavor = "current_thread")),
    "shared" => Ok(quote!(flavor = "multi_thread", worker_threads = 2)),
    _ => Err(error(span, USAGE)),
  }
}

fn error(span: Span, msg: &str) -> TokenStream {
  TokenStream::from(syn::Error::new(span, msg).to_compile_error())
}
