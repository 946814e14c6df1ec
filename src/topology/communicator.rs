//! `Communicator`: an ownership-tagged handle on a runtime communication context.
//!
//! Ownership rules:
//! - [`Communicator::world`] (and `Default`) wraps the global context and never owns it.
//! - A handle built around a newly created context owns it.
//! - `Clone` shares the context; the clone never owns. The owning handle
//!   must outlive every clone; this is a convention, the type
//!   does not enforce it.
//! - Rust moves carry ownership along; [`Communicator::transfer`] does the same
//!   while leaving a valid, non-owning handle behind.
//! - On drop, the context is released iff the handle owns it and it is not a
//!   built-in context (world, self, null).

use crate::config::{ValidationMode, WrapperConfig};
use crate::datatype::MpiDatatype;
use crate::mpi_error::{MpiWrapperError, Result};
use crate::transport::{Exchange, Rank, Status, Transport};

/// Whether a handle is responsible for releasing its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    Owned,
    Borrowed,
}

/// A process group reached through transport `T`.
#[derive(Debug)]
pub struct Communicator<T: Transport> {
    transport: T,
    handle: T::Handle,
    ownership: Ownership,
    config: WrapperConfig,
}

impl<T: Transport> Communicator<T> {
    /// The global communicator with the default configuration. Never owns.
    pub fn world(transport: T) -> Self {
        Self::world_with_config(transport, WrapperConfig::default())
    }

    /// The global communicator with an explicit configuration. Never owns.
    pub fn world_with_config(transport: T, config: WrapperConfig) -> Self {
        let handle = transport.world();
        Self {
            transport,
            handle,
            ownership: Ownership::Borrowed,
            config,
        }
    }

    /// Take ownership of a newly created context.
    ///
    /// # Safety
    ///
    /// `handle` must be a valid communicator of `transport`'s runtime that no
    /// other owning handle releases.
    pub unsafe fn from_raw(transport: T, handle: T::Handle, config: WrapperConfig) -> Self {
        Self::owned(transport, handle, config)
    }

    pub(crate) fn owned(transport: T, handle: T::Handle, config: WrapperConfig) -> Self {
        Self {
            transport,
            handle,
            ownership: Ownership::Owned,
            config,
        }
    }

    /// Duplicate the context (collective). The duplicate is owned and keeps
    /// this handle's configuration.
    pub fn duplicate(&self) -> Result<Self> {
        let handle = self
            .transport
            .comm_dup(self.handle)
            .map_err(MpiWrapperError::transport("comm_dup"))?;
        log::debug!("duplicated {:?} into {handle:?}", self.handle);
        Ok(Self::owned(self.transport.clone(), handle, self.config))
    }

    /// Move the ownership into a new handle; `self` keeps the context but no
    /// longer releases it.
    pub fn transfer(&mut self) -> Self {
        let ownership = std::mem::replace(&mut self.ownership, Ownership::Borrowed);
        Self {
            transport: self.transport.clone(),
            handle: self.handle,
            ownership,
            config: self.config,
        }
    }

    /// Raw context handle.
    #[inline]
    pub fn handle(&self) -> T::Handle {
        self.handle
    }

    #[inline]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    #[inline]
    pub fn config(&self) -> WrapperConfig {
        self.config
    }

    #[inline]
    pub fn validation_mode(&self) -> ValidationMode {
        self.config.validation
    }

    #[inline]
    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    /// `true` if dropping this handle releases the context.
    #[inline]
    pub fn is_owner(&self) -> bool {
        self.ownership == Ownership::Owned && !self.transport.is_builtin(self.handle)
    }

    /// Rank of the calling process in this group.
    pub fn rank(&self) -> Result<Rank> {
        self.transport
            .comm_rank(self.handle)
            .map_err(MpiWrapperError::transport("comm_rank"))
    }

    /// Number of processes in this group.
    pub fn size(&self) -> Result<i32> {
        self.transport
            .comm_size(self.handle)
            .map_err(MpiWrapperError::transport("comm_size"))
    }

    /// Blocking combined send-and-receive: `send` goes to `dest` while
    /// `recv` is filled from `source`, in one call so two peers exchanging
    /// with each other cannot deadlock.
    ///
    /// Element kinds come from `S` and `R`, counts from the slice lengths and
    /// the tag from [`WrapperConfig::exchange_tag`]. A `None` peer skips that
    /// half; receiving from `None` leaves `recv` untouched.
    ///
    /// Failures are reported in every validation mode.
    pub fn send_recv<S, R>(
        &self,
        send: &[S],
        dest: Option<Rank>,
        recv: &mut [R],
        source: Option<Rank>,
    ) -> Result<()>
    where
        S: MpiDatatype,
        R: MpiDatatype,
    {
        let send_count = count_of(send.len())?;
        let recv_count = count_of(recv.len())?;
        let exchange = Exchange {
            send: as_bytes(send),
            send_count,
            send_kind: S::KIND,
            dest,
            recv: as_bytes_mut(recv),
            recv_count,
            recv_kind: R::KIND,
            source,
            tag: self.config.exchange_tag,
        };
        self.transport
            .sendrecv(self.handle, exchange)
            .map_err(MpiWrapperError::ExchangeFailed)
    }

    /// Abort every process of the job.
    pub fn abort(&self, code: i32) -> ! {
        self.transport.abort(self.handle, code)
    }

    /// Release the context now and report a failure instead of handling it
    /// in `Drop`. Non-owning handles release nothing.
    pub fn free(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        if !self.is_owner() {
            return Ok(());
        }
        self.ownership = Ownership::Borrowed;
        self.transport
            .comm_free(self.handle)
            .map_err(MpiWrapperError::transport("comm_free"))?;
        log::debug!("released {:?}", self.handle);
        Ok(())
    }
}

fn count_of(len: usize) -> Result<i32> {
    i32::try_from(len).map_err(|_| MpiWrapperError::ExchangeFailed(Status::ERR_COUNT))
}

// bytemuck refuses to cast zero-sized elements.
fn as_bytes<T: MpiDatatype>(elems: &[T]) -> &[u8] {
    if std::mem::size_of::<T>() == 0 { &[] } else { bytemuck::cast_slice(elems) }
}

fn as_bytes_mut<T: MpiDatatype>(elems: &mut [T]) -> &mut [u8] {
    if std::mem::size_of::<T>() == 0 { &mut [] } else { bytemuck::cast_slice_mut(elems) }
}

impl<T: Transport> Clone for Communicator<T> {
    /// Shares the context; the clone never owns it.
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            handle: self.handle,
            ownership: Ownership::Borrowed,
            config: self.config,
        }
    }
}

impl<T: Transport + Default> Default for Communicator<T> {
    fn default() -> Self {
        Self::world(T::default())
    }
}

impl<T: Transport> Drop for Communicator<T> {
    fn drop(&mut self) {
        let handle = self.handle;
        if let Err(e) = self.release() {
            match self.config.validation {
                ValidationMode::Strict => {
                    log::error!("[communicator] releasing {handle:?}: {e}");
                    if !std::thread::panicking() {
                        panic!("[communicator] releasing {handle:?}: {e}");
                    }
                }
                ValidationMode::Permissive => {
                    log::warn!("[communicator] releasing {handle:?}: {e}");
                }
            }
        }
    }
}
