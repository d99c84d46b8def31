use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::error;

#[derive(Error, Debug)]
#[error("{0}")]
pub struct Error(String);

impl Error {
    pub fn new(s: &str) -> Error {
        Error(s.to_string())
    }

    pub fn from<E: std::error::Error>(e: E) -> Self {
        Self(e.to_string())
    }
}

#[async_trait]
pub trait Service {
    type Context: Clone + Send;
    async fn new(context: Self::Context) -> Self;
    async fn run(self) -> Result<(), Error>;
}

#[async_trait]
pub trait ServiceWithErrorSender {
    type Context: Clone + Send;
    async fn new(context: Self::Context, error_sender: mpsc::Sender<String>) -> Self;
    async fn run(self) -> Result<(), Error>;
}

#[async_trait]
pub trait ServiceWithErrorReceiver {
    type Context: Clone + Send;
    async fn new(
        context: Self::Context,
        error_receiver: Arc<Mutex<mpsc::Receiver<String>>>,
    ) -> Self;
    async fn run(self) -> Result<(), Error>;
}

// Supervises long-running services; a service that returns an error is
// rebuilt from the shared context and restarted.
pub struct ServiceManager<C> {
    context: C,
    services: JoinSet<()>,
}

impl<C> ServiceManager<C>
where
    C: 'static + Clone + Send,
{
    pub fn new(context: C) -> Self {
        Self {
            context,
            services: JoinSet::new(),
        }
    }

    pub fn spawn<T: Service<Context = C>>(&mut self) {
        let context = self.context.clone();
        self.services.spawn(async move {
            loop {
                let service = T::new(context.clone()).await;
                if let Err(e) = service.run().await {
                    error!(error = %e, "Service exited, restarting");
                    continue;
                }
            }
        });
    }

    pub fn spawn_with_error_sender<T: ServiceWithErrorSender<Context = C>>(
        &mut self,
        sender: mpsc::Sender<String>,
    ) {
        let context = self.context.clone();
        self.services.spawn(async move {
            loop {
                let service = T::new(context.clone(), sender.clone()).await;
                if let Err(e) = service.run().await {
                    error!(error = %e, "Service exited, restarting");
                    continue;
                }
            }
        });
    }

    pub fn spawn_with_error_receiver<T: ServiceWithErrorReceiver<Context = C>>(
        &mut self,
        receiver: Arc<Mutex<mpsc::Receiver<String>>>,
    ) {
        let context = self.context.clone();
        self.services.spawn(async move {
            loop {
                let service = T::new(context.clone(), receiver.clone()).await;
                if let Err(e) = service.run().await {
                    error!(error = %e, "Service exited, restarting");
                    continue;
                }
            }
        });
    }

    pub async fn wait(&mut self) -> Result<(), Error> {
        if self.services.join_next().await.is_some() {
            return Err(Error::new("Internal Service Error"));
        }
        Ok(())
    }
}
