//! Reusable compiler-pass infrastructure.
//!
//! Every stage of the linnet pipeline — topology analysis, LES construction, the
//! symbolic solver, frequency-domain normalization, rendering-order selection — is
//! expressed as a [`Pass`]. A pass owns whatever context it needs (a diagnostics
//! handle, a reference to the symbol table, ...) and transforms one value into
//! another, or fails with a pass-specific error.
//!
//! Passes compose with [`Pass::chain`], which threads the output of one pass as the
//! input of the next and unifies their error types via [`Into`].

/// A single transformation stage in a pipeline.
///
/// `Input`/`Output` are generic associated types so that a pass may borrow from the
/// lifetime of the value it is given, without forcing every pass in a pipeline to
/// share one lifetime parameter.
pub trait Pass {
    type Input<'a>;
    type Output<'a>;
    type Error;

    /// Runs this pass, consuming `input` and producing `Self::Output`, or an error.
    fn run<'a>(&mut self, input: Self::Input<'a>) -> Result<Self::Output<'a>, Self::Error>;

    /// Chains this pass with another, running `self` and then `next` on its output.
    ///
    /// The resulting error type is `Self::Error`; `next`'s error is converted via
    /// [`Into`], so pipeline stages typically share one workspace-wide error enum or
    /// rely on `#[from]` conversions between per-crate error types.
    fn chain<P>(self, next: P) -> Chain<Self, P>
    where
        Self: Sized,
        P: for<'a> Pass<Input<'a> = Self::Output<'a>>,
    {
        Chain { first: self, second: next }
    }
}

/// The result of [`Pass::chain`]: runs `first`, then feeds its output to `second`.
pub struct Chain<A, B> {
    first: A,
    second: B,
}

impl<A, B, E> Pass for Chain<A, B>
where
    A: Pass<Error = E>,
    B: for<'a> Pass<Input<'a> = A::Output<'a>>,
    E: From<<B as Pass>::Error>,
{
    type Input<'a> = A::Input<'a>;
    type Output<'a> = <B as Pass>::Output<'a>;
    type Error = E;

    fn run<'a>(&mut self, input: Self::Input<'a>) -> Result<Self::Output<'a>, Self::Error> {
        let mid = self.first.run(input)?;
        self.second.run(mid).map_err(E::from)
    }
}
