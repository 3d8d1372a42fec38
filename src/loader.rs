use std::rc::Rc;

use crate::{AsyncView, AsyncViewProps, Awaitable, Computation, ErrorBoundary};


/// Creates a [`LoaderFactory`] from a function that starts loading for given properties.
///
/// Without a [`resolver`](LoaderFactory::resolver), every instance loads exactly once.
pub fn create_loader<P: 'static, T, E>(
    loader: impl Fn(&P) -> Awaitable<T, E> + 'static,
) -> LoaderFactory<P, (), T, E> {
    LoaderFactory {
        loader: Rc::new(loader),
        resolver: Rc::new(|_: &P| ()),
        deferred: false,
    }
}

/// Builder of [`Loader`]s sharing a loading function and a key resolver.
pub struct LoaderFactory<P, K, T, E> {
    loader: Rc<dyn Fn(&P) -> Awaitable<T, E>>,
    resolver: Rc<dyn Fn(&P) -> K>,
    deferred: bool,
}

impl<P, K, T, E> Clone for LoaderFactory<P, K, T, E> {
    fn clone(&self) -> Self {
        Self {
            loader: self.loader.clone(),
            resolver: self.resolver.clone(),
            deferred: self.deferred,
        }
    }
}

impl<P, K, T, E> LoaderFactory<P, K, T, E>
where
    P: 'static,
    K: PartialEq + 'static,
    T: Clone + 'static,
    E: Clone + 'static,
{
    /// Sets the function that maps properties to a key.
    ///
    /// Loading happens again only when the key changes.
    pub fn resolver<K2: PartialEq + 'static>(
        self,
        resolver: impl Fn(&P) -> K2 + 'static,
    ) -> LoaderFactory<P, K2, T, E> {
        LoaderFactory {
            loader: self.loader,
            resolver: Rc::new(resolver),
            deferred: self.deferred,
        }
    }

    /// Mounts loaders without loading. Loading starts on [`Loader::reload`].
    pub fn deferred(mut self) -> Self {
        self.deferred = true;
        self
    }

    pub fn mount<V: 'static>(
        &self,
        props: P,
        view_props: AsyncViewProps<T, E, V>,
    ) -> Loader<P, K, T, E, V> {
        self.mount_with(props, view_props, None)
    }

    pub fn mount_in<V: 'static>(
        &self,
        props: P,
        view_props: AsyncViewProps<T, E, V>,
        boundary: &ErrorBoundary<E>,
    ) -> Loader<P, K, T, E, V> {
        self.mount_with(props, view_props, Some(boundary))
    }

    fn mount_with<V: 'static>(
        &self,
        props: P,
        view_props: AsyncViewProps<T, E, V>,
        boundary: Option<&ErrorBoundary<E>>,
    ) -> Loader<P, K, T, E, V> {
        let key = (self.resolver)(&props);
        let value = if self.deferred {
            Awaitable::Computation(Computation::never())
        } else {
            log::debug!("loading on mount");
            (self.loader)(&props)
        };
        let view_props = view_props.value(value);
        let view = match boundary {
            Some(boundary) => AsyncView::mount_in(view_props, boundary),
            None => AsyncView::mount(view_props),
        };
        Loader {
            factory: self.clone(),
            props,
            key,
            view,
        }
    }
}

/// An [`AsyncView`] whose value is loaded from its properties.
pub struct Loader<P, K, T, E, V> {
    factory: LoaderFactory<P, K, T, E>,
    props: P,
    key: K,
    view: AsyncView<T, E, V>,
}

impl<P, K, T, E, V> Loader<P, K, T, E, V>
where
    P: 'static,
    K: PartialEq + 'static,
    T: Clone + 'static,
    E: Clone + 'static,
    V: 'static,
{
    /// Replaces the properties.
    ///
    /// Loads again only if the key resolved from `props` differs from the current one.
    /// Otherwise the view is left untouched.
    pub fn update(&mut self, props: P) {
        let key = (self.factory.resolver)(&props);
        self.props = props;
        if key != self.key {
            self.key = key;
            log::debug!("loading on key change");
            self.load();
        }
    }

    /// Loads again with the current properties, whatever the key.
    pub fn reload(&mut self) {
        log::debug!("loading on reload");
        self.load();
    }

    /// Replaces the hooks of the view and performs a render pass, without loading.
    ///
    /// The value of `view_props` is ignored.
    pub fn set_view_props(&self, view_props: AsyncViewProps<T, E, V>) {
        self.view.update(view_props.value(self.view.value()));
    }

    fn load(&self) {
        let value = (self.factory.loader)(&self.props);
        self.view.set_value(value);
    }

    pub fn props(&self) -> &P {
        &self.props
    }
    pub fn key(&self) -> &K {
        &self.key
    }
    pub fn view(&self) -> &AsyncView<T, E, V> {
        &self.view
    }

    pub fn unmount(self) {}
}
