use std::sync::{Arc, Weak};

/// Something that can be invoked with an observer handle `H` and a payload `P`.
///
/// Both calling conventions, a closure or a method on a target object, are adapted into this one type.
pub struct Callback<H, P>(Arc<dyn Fn(&H, &P) + Send + Sync>);

impl<H, P> Clone for Callback<H, P> {
    fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<H, P> Callback<H, P> {
    pub fn new<F>(f: F) -> Self
    where F: Fn(&H, &P) + Send + Sync + 'static {
        Self(Arc::new(f))
    }

    /// Calls `method` on `target` for each delivery.
    ///
    /// The target is held weakly. Once it has been dropped, deliveries are ignored.
    pub fn method<T>(target: &Arc<T>, method: fn(&T, &H, &P)) -> Self
    where
        T: Send + Sync + 'static,
        H: 'static,
        P: 'static,
    {
        let target: Weak<T> = Arc::downgrade(target);
        Self(Arc::new(move |handle: &H, payload: &P| match target.upgrade() {
            Some(target) => method(&target, handle, payload),
            None => tracing::trace!("callback target was dropped, ignoring delivery"),
        }))
    }

    pub fn invoke(&self, handle: &H, payload: &P) { (self.0)(handle, payload) }
}

impl<H, P> std::fmt::Debug for Callback<H, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str("Callback") }
}

/// Trait for types that can be converted into a [`Callback`]
pub trait IntoCallback<H, P> {
    fn into_callback(self) -> Callback<H, P>;
}

impl<F, H, P> IntoCallback<H, P> for F
where F: Fn(&H, &P) + Send + Sync + 'static
{
    fn into_callback(self) -> Callback<H, P> { Callback::new(self) }
}

impl<H, P> IntoCallback<H, P> for Callback<H, P> {
    fn into_callback(self) -> Callback<H, P> { self }
}
