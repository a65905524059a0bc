//! Response body decorator.
//!
//! Every frame the server writes passes through [`CountingBody`], which makes
//! it the one place where response bytes are counted and where the end of the
//! response is detected:
//!
//! ```text
//! poll_frame → data frame      → count bytes; end of stream? → Finished
//!            → None            → Finished
//!            → Err             → BodyError
//! drop before end of stream    → ClientDisconnect
//! drop unpolled, HEAD request   → Finished
//! ```

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};

use crate::instrumentation::hooks::RequestInstrumentation;
use crate::instrumentation::outcome::ExitTrigger;
use crate::instrumentation::trace::RequestTrace;

pub struct CountingBody<B: Body> {
    inner: B,
    trace: Arc<RequestTrace>,
    instrumentation: RequestInstrumentation,
    status: u16,
    polled: bool,
    done: bool,
}

impl<B: Body> CountingBody<B> {
    pub fn new(
        inner: B,
        trace: Arc<RequestTrace>,
        instrumentation: RequestInstrumentation,
        status: u16,
    ) -> Self {
        Self {
            inner,
            trace,
            instrumentation,
            status,
            polled: false,
            done: false,
        }
    }

    pub fn trace(&self) -> &RequestTrace {
        &self.trace
    }

    fn exit(&mut self, trigger: ExitTrigger) {
        if self.done {
            return;
        }
        self.done = true;
        let instr = &self.instrumentation;
        match trigger {
            ExitTrigger::BodySent => instr.on_body_sent(&self.trace, self.status, None),
            ExitTrigger::Finished => instr.on_finished(&self.trace, self.status),
            ExitTrigger::ClientDisconnect => instr.on_client_disconnect(&self.trace, self.status),
            ExitTrigger::BodyError => instr.on_body_error(&self.trace, self.status),
        };
    }
}

impl<B> Body for CountingBody<B>
where
    B: Body<Data = Bytes> + Unpin,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        this.polled = true;
        let polled = Pin::new(&mut this.inner).poll_frame(cx);

        match &polled {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.instrumentation.on_chunk(&this.trace, data.len());
                }
                if this.inner.is_end_stream() {
                    this.exit(ExitTrigger::Finished);
                }
            }
            Poll::Ready(Some(Err(_))) => this.exit(ExitTrigger::BodyError),
            Poll::Ready(None) => this.exit(ExitTrigger::Finished),
            Poll::Pending => {}
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl<B: Body> Drop for CountingBody<B> {
    fn drop(&mut self) {
        // Empty bodies and HEAD responses are dropped without being polled.
        let unsent_head = !self.polled && self.trace.method() == "HEAD";
        let trigger = if self.inner.is_end_stream() || unsent_head {
            ExitTrigger::Finished
        } else {
            ExitTrigger::ClientDisconnect
        };
        self.exit(trigger);
    }
}
