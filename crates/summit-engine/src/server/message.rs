//! Control channel from the logic thread to the render thread.
//!
//! Messages carry registrations and handles only. Per-frame data stays in
//! the shared versioned buffers.

use std::sync::mpsc;

use crate::error::{Result, SyncError};
use crate::paint::Color;

use super::ids::{ObjectId, TargetId};
use super::registration::{ObjectRegistration, RenderTargetDesc};

/// Answer to [`Message::InitCanvas`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ready,
    Failed(String),
}

/// One control operation, applied in send order.
#[derive(Debug)]
pub enum Message<C> {
    InitCanvas {
        canvas: C,
        background: Color,
        reply: mpsc::Sender<Reply>,
    },
    ResizeCanvas {
        width: u32,
        height: u32,
    },
    CreateObject(Box<ObjectRegistration>),
    RemoveObject(ObjectId),
    CreateRenderTarget(RenderTargetDesc),
    RemoveRenderTarget(TargetId),
    AddObjectToTarget {
        target: TargetId,
        object: ObjectId,
    },
    RemoveObjectFromTarget {
        target: TargetId,
        object: ObjectId,
    },
}

/// Creates a connected logic-side handle and render-side inbox.
pub fn channel<C>() -> (ServerHandle<C>, ServerInbox<C>) {
    let (tx, rx) = mpsc::channel();
    (ServerHandle { tx }, ServerInbox { rx })
}

/// Logic-side sender. Clone it freely; the inbox reports disconnection once
/// every handle is dropped.
#[derive(Debug)]
pub struct ServerHandle<C> {
    tx: mpsc::Sender<Message<C>>,
}

impl<C> Clone for ServerHandle<C> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<C> ServerHandle<C> {
    pub fn send(&self, message: Message<C>) -> Result<()> {
        self.tx.send(message).map_err(|_| SyncError::Disconnected)
    }

    /// Queues canvas initialization. The returned receiver yields exactly
    /// one [`Reply`] once the render side has processed it.
    pub fn init_canvas(&self, canvas: C, background: Color) -> Result<mpsc::Receiver<Reply>> {
        let (reply, ready) = mpsc::channel();
        self.send(Message::InitCanvas {
            canvas,
            background,
            reply,
        })?;
        Ok(ready)
    }

    pub fn resize_canvas(&self, width: u32, height: u32) -> Result<()> {
        self.send(Message::ResizeCanvas { width, height })
    }

    pub fn create_object(&self, registration: ObjectRegistration) -> Result<()> {
        self.send(Message::CreateObject(Box::new(registration)))
    }

    pub fn remove_object(&self, id: impl Into<ObjectId>) -> Result<()> {
        self.send(Message::RemoveObject(id.into()))
    }

    pub fn create_render_target(&self, desc: RenderTargetDesc) -> Result<()> {
        self.send(Message::CreateRenderTarget(desc))
    }

    pub fn remove_render_target(&self, id: impl Into<TargetId>) -> Result<()> {
        self.send(Message::RemoveRenderTarget(id.into()))
    }

    pub fn add_object_to_target(
        &self,
        target: impl Into<TargetId>,
        object: impl Into<ObjectId>,
    ) -> Result<()> {
        self.send(Message::AddObjectToTarget {
            target: target.into(),
            object: object.into(),
        })
    }

    pub fn remove_object_from_target(
        &self,
        target: impl Into<TargetId>,
        object: impl Into<ObjectId>,
    ) -> Result<()> {
        self.send(Message::RemoveObjectFromTarget {
            target: target.into(),
            object: object.into(),
        })
    }
}

/// Render-side receiving end.
#[derive(Debug)]
pub struct ServerInbox<C> {
    rx: mpsc::Receiver<Message<C>>,
}

/// Outcome of draining the inbox once.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct PumpStatus {
    pub applied: usize,
    /// Every handle has been dropped and the queue is empty.
    pub disconnected: bool,
}

impl<C> ServerInbox<C> {
    /// Next queued message without blocking.
    ///
    /// `Ok(None)` means the queue is empty for now; `Err(Disconnected)`
    /// means it is empty for good.
    pub fn try_next(&self) -> Result<Option<Message<C>>> {
        match self.rx.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(mpsc::TryRecvError::Empty) => Ok(None),
            Err(mpsc::TryRecvError::Disconnected) => Err(SyncError::Disconnected),
        }
    }

    /// Blocks until a message arrives.
    pub fn next_blocking(&self) -> Result<Message<C>> {
        self.rx.recv().map_err(|_| SyncError::Disconnected)
    }
}
