//! Shared task implementations for integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use pipeweave::connectors::{Input, Output};
use pipeweave::message::Packet;
use pipeweave::node::{Task, TaskError};

/// Emits a fixed list of values, then exits.
pub struct EmitTask {
    pub out: Output<i64>,
    pub values: Vec<i64>,
}

#[async_trait]
impl Task for EmitTask {
    async fn action(&self) -> Result<(), TaskError> {
        for value in &self.values {
            self.out.put(*value).await?;
        }
        Ok(())
    }
}

/// Doubles every value flowing through it.
pub struct DoubleTask {
    pub numbers: Input<i64>,
    pub doubled: Output<i64>,
}

#[async_trait]
impl Task for DoubleTask {
    async fn action(&self) -> Result<(), TaskError> {
        while let Ok(value) = self.numbers.recv().await {
            self.doubled.put(value * 2).await?;
        }
        Ok(())
    }
}

/// Captures everything it receives until upstream drains.
pub struct CollectTask {
    pub numbers: Input<i64>,
    pub seen: Arc<Mutex<Vec<i64>>>,
}

#[async_trait]
impl Task for CollectTask {
    async fn action(&self) -> Result<(), TaskError> {
        while let Ok(value) = self.numbers.recv().await {
            self.seen.lock().push(value);
        }
        Ok(())
    }
}

/// Sleeps for a long time in `action` and records whether teardown ran.
pub struct SleepyTask {
    pub out: Output<i64>,
    pub teardown_ran: Arc<AtomicBool>,
}

#[async_trait]
impl Task for SleepyTask {
    async fn action(&self) -> Result<(), TaskError> {
        tokio::time::sleep(Duration::from_secs(600)).await;
        Ok(())
    }

    async fn teardown(&self) -> Result<(), TaskError> {
        self.teardown_ran.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Fails immediately inside `action`.
pub struct FailingTask {
    pub numbers: Input<i64>,
}

#[async_trait]
impl Task for FailingTask {
    async fn action(&self) -> Result<(), TaskError> {
        Err(TaskError::msg("intentional failure"))
    }
}

/// Emits framed packets ending in an explicit kill request.
pub struct PacketEmitTask {
    pub out: Output<Packet<i64>>,
    pub values: Vec<i64>,
}

#[async_trait]
impl Task for PacketEmitTask {
    async fn action(&self) -> Result<(), TaskError> {
        for value in &self.values {
            self.out.put(Packet::Data(*value)).await?;
        }
        self.out.put(Packet::Kill).await?;
        Ok(())
    }
}

/// Collects framed packets until it sees a kill request.
pub struct PacketCollectTask {
    pub packets: Input<Packet<i64>>,
    pub seen: Arc<Mutex<Vec<i64>>>,
}

#[async_trait]
impl Task for PacketCollectTask {
    async fn action(&self) -> Result<(), TaskError> {
        while let Ok(packet) = self.packets.recv().await {
            match packet {
                Packet::Data(value) => self.seen.lock().push(value),
                Packet::Kill => break,
            }
        }
        Ok(())
    }
}
