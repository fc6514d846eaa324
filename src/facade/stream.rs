use super::ConnectorFacade;
use crate::connector::{
    ConnectorObject, Filter, ObjectClass, OperationOptions, ResultsHandler, SearchResult,
};
use crate::error::Result;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

enum StreamEvent {
    Object(ConnectorObject),
    Done(Result<SearchResult>),
}

/// Forwards one object per unit of demand; declines once the stream is gone.
struct DemandHandler {
    demand: mpsc::UnboundedReceiver<()>,
    events: mpsc::Sender<StreamEvent>,
}

#[async_trait]
impl ResultsHandler for DemandHandler {
    async fn handle(&mut self, object: ConnectorObject) -> bool {
        if self.demand.recv().await.is_none() {
            return false;
        }
        self.events.send(StreamEvent::Object(object)).await.is_ok()
    }
}

/// Pull-based view of a callback search.
///
/// The connector only produces the next object after the consumer polls for
/// it. Dropping or [`cancel`](SearchStream::cancel)ling the stream makes the
/// connector's handler decline, which ends the search.
pub struct SearchStream {
    demand: Option<mpsc::UnboundedSender<()>>,
    events: mpsc::Receiver<StreamEvent>,
    task: Option<JoinHandle<()>>,
    requested: bool,
    finished: bool,
    search_result: Option<SearchResult>,
}

pub fn search_stream(
    facade: Arc<dyn ConnectorFacade>,
    object_class: ObjectClass,
    filter: Option<Filter>,
    options: OperationOptions,
) -> SearchStream {
    let (demand_tx, demand_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::channel(1);

    let task = tokio::spawn(async move {
        let mut handler = DemandHandler {
            demand: demand_rx,
            events: events_tx.clone(),
        };
        let result = facade
            .search(&object_class, filter.as_ref(), &mut handler, &options)
            .await;
        drop(handler);
        if events_tx.send(StreamEvent::Done(result)).await.is_err() {
            debug!(connector = %facade.connector_key(), "Search stream dropped before completion");
        }
    });

    SearchStream {
        demand: Some(demand_tx),
        events: events_rx,
        task: Some(task),
        requested: false,
        finished: false,
        search_result: None,
    }
}

impl SearchStream {
    /// Summary returned by the connector once the stream has ended normally.
    pub fn search_result(&self) -> Option<&SearchResult> {
        self.search_result.as_ref()
    }

    /// Stops the search and waits until the connector has returned.
    pub async fn cancel(mut self) {
        self.demand.take();
        self.events.close();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Stream for SearchStream {
    type Item = Result<ConnectorObject>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.finished {
            return Poll::Ready(None);
        }

        if !this.requested {
            // A failed send means the search already returned; its result is queued.
            if let Some(demand) = &this.demand {
                if demand.send(()).is_ok() {
                    this.requested = true;
                }
            }
        }

        match this.events.poll_recv(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(StreamEvent::Object(object))) => {
                this.requested = false;
                Poll::Ready(Some(Ok(object)))
            }
            Poll::Ready(Some(StreamEvent::Done(Ok(result)))) => {
                this.finished = true;
                this.search_result = Some(result);
                Poll::Ready(None)
            }
            Poll::Ready(Some(StreamEvent::Done(Err(e)))) => {
                this.finished = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
        }
    }
}
