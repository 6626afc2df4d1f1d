//! Provider SDK loading.
//!
//! A provider SDK is either handed over ready-made or supplied lazily by an
//! async factory. Either way the adapter asks the loader, which runs the
//! factory once and hands out the memoized outcome afterwards.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::OnceCell;

use super::ProviderError;

type ClientFuture<T> = Pin<Box<dyn Future<Output = Result<Arc<T>, ProviderError>> + Send>>;
type ClientSupplier<T> = Box<dyn Fn() -> ClientFuture<T> + Send + Sync>;

/// Ready or deferred SDK client
pub struct ClientLoader<T: ?Sized> {
    cell: OnceCell<Result<Arc<T>, ProviderError>>,
    supplier: Option<ClientSupplier<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> ClientLoader<T> {
    /// Wrap an already constructed client
    pub fn ready(client: Arc<T>) -> Self {
        Self {
            cell: OnceCell::new_with(Some(Ok(client))),
            supplier: None,
        }
    }

    /// Defer construction until first use
    pub fn deferred<F, Fut>(supplier: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<T>, ProviderError>> + Send + 'static,
    {
        Self {
            cell: OnceCell::new(),
            supplier: Some(Box::new(move || -> ClientFuture<T> { Box::pin(supplier()) })),
        }
    }

    /// Get the client, running the supplier on first call
    pub async fn get(&self) -> Result<Arc<T>, ProviderError> {
        self.cell
            .get_or_init(|| async {
                match &self.supplier {
                    Some(supplier) => supplier().await,
                    None => Err(ProviderError::ProviderUnavailable(
                        "No client supplied".to_string(),
                    )),
                }
            })
            .await
            .clone()
    }

    /// Whether the supplier has already run
    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }
}

impl<T: ?Sized> std::fmt::Debug for ClientLoader<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientLoader")
            .field("loaded", &self.cell.initialized())
            .field("deferred", &self.supplier.is_some())
            .finish()
    }
}
