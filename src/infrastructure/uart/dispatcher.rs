//! Frame reassembly and command dispatch.
//!
//! Deliveries from the UART rarely line up with frame boundaries. A delivery
//! is first decoded as-is; if that fails its bytes join the carry-over buffer
//! and the buffer is replayed into a growing window, one byte at a time,
//! until the window decodes or the buffer runs dry. A window holding a
//! complete but rejected frame is dropped so it cannot block later frames.

use crate::domain::config::{Channels, Modulation, ScanConfig};
use crate::domain::error::{BridgeError, BridgeResult, FirstError};
use crate::domain::models::{AllParams, Command, CommandParams, Frame, Task};
use crate::infrastructure::deferred::IsrHandle;
use crate::infrastructure::hal::Watchdog;
use crate::infrastructure::uart::protocol::WireCodec;
use crate::infrastructure::uart::reassembly::ReassemblyBuffer;
use tracing::{debug, trace, warn};

/// What a dispatch pass needs besides the carry-over buffer.
pub struct DispatchContext<'a> {
    pub config: &'a mut ScanConfig,
    pub codec: &'a dyn WireCodec,
    pub deferred: &'a IsrHandle,
    pub watchdog: &'a mut dyn Watchdog,
}

#[derive(Default)]
pub struct FrameDispatcher {
    buffer: ReassemblyBuffer,
}

impl FrameDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle one UART delivery. Returns how many frames were dispatched.
    ///
    /// Undecodable bytes are kept for the next delivery; they are never an
    /// error. Errors are buffer overflow and a full deferred queue.
    pub fn on_bytes(&mut self, bytes: &[u8], ctx: &mut DispatchContext<'_>) -> BridgeResult<usize> {
        if let Ok((frame, used)) = ctx.codec.decode(bytes) {
            if !self.buffer.is_empty() {
                debug!("Discarding {} stale buffered bytes", self.buffer.len());
                self.buffer.reset();
            }

            let mut status = FirstError::new();
            status.record(self.dispatch(frame, ctx));

            let mut dispatched = 1;
            let rest = &bytes[used..];
            if !rest.is_empty() {
                status.record(self.buffer.ingest(rest));
                match self.reassemble(ctx) {
                    Ok(count) => dispatched += count,
                    Err(e) => status.record(Err(e)),
                }
            }
            return status.finish().map(|_| dispatched);
        }

        self.buffer.ingest(bytes)?;
        self.reassemble(ctx)
    }

    fn reassemble(&mut self, ctx: &mut DispatchContext<'_>) -> BridgeResult<usize> {
        let mut window = Vec::with_capacity(self.buffer.len());
        let mut status = FirstError::new();
        let mut dispatched = 0;

        while let Some(byte) = self.buffer.drain_one() {
            window.push(byte);
            match ctx.codec.decode(&window) {
                Ok((frame, _)) => {
                    window.clear();
                    dispatched += 1;
                    status.record(self.dispatch(frame, ctx));
                }
                Err(e) if e.is_rejected_frame() => {
                    warn!("Dropping {} byte frame: {}", window.len(), e);
                    window.clear();
                }
                Err(e) => trace!("Window of {} bytes: {}", window.len(), e),
            }
        }

        if !window.is_empty() {
            debug!("Keeping {} bytes for the next delivery", window.len());
            // These bytes were just drained, so they fit again
            status.record(self.buffer.ingest(&window));
        }

        status.finish().map(|_| dispatched)
    }

    fn dispatch(&mut self, frame: Frame, ctx: &mut DispatchContext<'_>) -> BridgeResult {
        debug!("Dispatching {:?}", frame);
        let result = apply_config(&frame, ctx.config);
        if let Err(e) = &result {
            warn!("{:?} failed: {}", frame.command, e);
        }

        let reply = match frame.command {
            Command::GetDeviceId => Task::SendDeviceId,
            command => Task::SendAck {
                command,
                ok: result.is_ok(),
            },
        };

        let mut status = FirstError::new();
        status.record(ctx.deferred.defer(reply));
        ctx.watchdog.feed();
        status.record(ctx.deferred.defer(Task::TxFinished));
        status.finish()
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

/// Apply a host command to the configuration store.
pub fn apply_config(frame: &Frame, config: &mut ScanConfig) -> BridgeResult {
    match (frame.command, frame.params) {
        // Answered by the deferred DEVICE_ID response
        (Command::GetDeviceId, _) => Ok(()),
        (Command::SetFltrTags, CommandParams::Bool(state)) => config.manufacturer_filter_set(state),
        (Command::SetFltrId, CommandParams::FilterId(id)) => config.manufacturer_id_set(id),
        (Command::SetCodedPhy, CommandParams::Bool(state)) => {
            config.modulation_enable(Modulation::Coded125k, state)
        }
        (Command::SetScan1MbPhy, CommandParams::Bool(state)) => {
            config.modulation_enable(Modulation::OneMbps, state)
        }
        (Command::SetScan2MbPhy, CommandParams::Bool(state)) => {
            config.modulation_enable(Modulation::TwoMbps, state)
        }
        (Command::SetCh37, CommandParams::Bool(state)) => {
            let mut channels = config.channels();
            channels.ch37 = state;
            config.channels_set(channels)
        }
        (Command::SetCh38, CommandParams::Bool(state)) => {
            let mut channels = config.channels();
            channels.ch38 = state;
            config.channels_set(channels)
        }
        (Command::SetCh39, CommandParams::Bool(state)) => {
            let mut channels = config.channels();
            channels.ch39 = state;
            config.channels_set(channels)
        }
        (Command::SetAll, CommandParams::All(params)) => apply_all(&params, config),
        _ => Err(BridgeError::InvalidParameter(
            "parameters do not match the command",
        )),
    }
}

/// Every field is applied even if an earlier one fails; the first failure is reported.
fn apply_all(params: &AllParams, config: &mut ScanConfig) -> BridgeResult {
    let mut status = FirstError::new();
    status.record(config.manufacturer_id_set(params.fltr_id));
    status.record(config.manufacturer_filter_set(params.fltr_tags));
    config.max_adv_length_set(params.max_adv_len);
    status.record(config.channels_set(Channels::new(params.ch_37, params.ch_38, params.ch_39)));
    status.record(config.modulation_enable(Modulation::Coded125k, params.use_coded_phy));
    status.record(config.modulation_enable(Modulation::OneMbps, params.use_1m_phy));
    status.record(config.modulation_enable(Modulation::TwoMbps, params.use_2m_phy));
    status.finish()
}
