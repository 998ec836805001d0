//! A fan-out layer over a runtime-sized list of boxed layers.
//!
//! Each configured logging output contributes a filter layer paired with a format layer,
//! and the number of outputs is only known after the config is loaded, so the layer
//! stack can not be spelled out as a static type.

use tracing_core::{
    callsite, span,
    subscriber::{Interest, Subscriber},
    Event, Metadata,
};
use tracing_subscriber::layer::{Context, Layer as LayerTrait};

type BoxedLayer<S> = Box<dyn LayerTrait<S> + Send + Sync + 'static>;

/// Forwards every callback to all of its inner layers, in insertion order
pub struct Layer<S> {
    inners: Vec<BoxedLayer<S>>,
}

impl<S> LayerTrait<S> for Layer<S>
where
    S: Subscriber,
{
    fn register_callsite(&self, metadata: &'static Metadata<'static>) -> Interest {
        let mut combined = Interest::always();
        for layer in &self.inners {
            // "never" and "sometimes" both win over "always", and must not be overridden
            if !combined.is_always() {
                break;
            }
            combined = layer.register_callsite(metadata);
        }
        combined
    }

    fn enabled(&self, metadata: &Metadata<'_>, ctx: Context<'_, S>) -> bool {
        self.inners
            .iter()
            .all(|layer| layer.enabled(metadata, ctx.clone()))
    }

    fn new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        self.inners
            .iter()
            .for_each(|layer| layer.new_span(attrs, id, ctx.clone()));
    }

    fn on_record(&self, span: &span::Id, values: &span::Record<'_>, ctx: Context<'_, S>) {
        self.inners
            .iter()
            .for_each(|layer| layer.on_record(span, values, ctx.clone()));
    }

    fn on_follows_from(&self, span: &span::Id, follows: &span::Id, ctx: Context<'_, S>) {
        self.inners
            .iter()
            .for_each(|layer| layer.on_follows_from(span, follows, ctx.clone()));
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        self.inners
            .iter()
            .for_each(|layer| layer.on_event(event, ctx.clone()));
    }

    fn on_enter(&self, id: &span::Id, ctx: Context<'_, S>) {
        self.inners
            .iter()
            .for_each(|layer| layer.on_enter(id, ctx.clone()));
    }

    fn on_exit(&self, id: &span::Id, ctx: Context<'_, S>) {
        self.inners
            .iter()
            .for_each(|layer| layer.on_exit(id, ctx.clone()));
    }

    fn on_close(&self, id: span::Id, ctx: Context<'_, S>) {
        self.inners
            .iter()
            .for_each(|layer| layer.on_close(id.clone(), ctx.clone()));
    }

    fn on_id_change(&self, old: &span::Id, new: &span::Id, ctx: Context<'_, S>) {
        self.inners
            .iter()
            .for_each(|layer| layer.on_id_change(old, new, ctx.clone()));
    }
}

impl<S> Layer<S>
where
    S: Subscriber,
{
    pub fn empty() -> Self {
        Self { inners: vec![] }
    }

    pub fn new<T, L>(layers: T) -> Self
    where
        T: IntoIterator<Item = L>,
        L: LayerTrait<S> + Send + Sync + 'static,
    {
        let mut this = Self::empty();
        this.extend(layers);
        this
    }

    pub fn add<L>(&mut self, layer: L) -> &mut Self
    where
        L: LayerTrait<S> + Send + Sync + 'static,
    {
        self.inners.push(Box::new(layer));
        // cached interests were computed without the new layer
        callsite::rebuild_interest_cache();
        self
    }
}

impl<S, L> Extend<L> for Layer<S>
where
    S: Subscriber,
    L: LayerTrait<S> + Send + Sync + 'static,
{
    fn extend<T>(&mut self, layers: T)
    where
        T: IntoIterator<Item = L>,
    {
        self.inners
            .extend(layers.into_iter().map(|l| -> BoxedLayer<S> { Box::new(l) }));
        callsite::rebuild_interest_cache();
    }
}
