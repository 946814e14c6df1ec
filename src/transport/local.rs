//! In-process runtime: a world of `size` simulated ranks in one address space.
//!
//! Every rank talks to the runtime through its own [`LocalTransport`]; ranks
//! may run on separate threads ([`LocalWorld::run`]) or be driven one after
//! the other from a single thread, since only `sendrecv` ever blocks.
//!
//! Collective creation calls (`comm_dup`, `cart_create`) are matched across
//! ranks by call order: the k-th creation a rank performs on a parent context
//! resolves to the same child context on every rank. Ranks are never
//! reordered, and the grid is laid out row-major (last dimension fastest),
//! as MPI does.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use static_assertions::assert_impl_all;

use super::{Exchange, Rank, Status, Transport, TransportResult};
use crate::datatype::ElementKind;

/// Communicator handle of the local runtime.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalComm(u64);

impl LocalComm {
    pub const NULL: LocalComm = LocalComm(0);
    pub const WORLD: LocalComm = LocalComm(1);
    pub const SELF: LocalComm = LocalComm(2);
    const FIRST_DYNAMIC: u64 = 3;

    /// Raw identifier.
    #[inline]
    pub const fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for LocalComm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            LocalComm::NULL => f.write_str("LocalComm(NULL)"),
            LocalComm::WORLD => f.write_str("LocalComm(WORLD)"),
            LocalComm::SELF => f.write_str("LocalComm(SELF)"),
            LocalComm(id) => f.debug_tuple("LocalComm").field(&id).finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CartLayout {
    dims: Vec<i32>,
    periods: Vec<bool>,
}

impl CartLayout {
    fn coords_of(&self, mut rank: usize, out: &mut [i32]) {
        for (slot, &extent) in out.iter_mut().zip(&self.dims).rev() {
            let extent = extent as usize;
            *slot = (rank % extent) as i32;
            rank /= extent;
        }
    }

    /// Periodic coordinates are shifted back into range; out-of-range
    /// non-periodic coordinates are an argument error.
    fn rank_of(&self, coords: &[i32]) -> TransportResult<Rank> {
        let mut rank = 0i64;
        for ((&c, &extent), &periodic) in coords.iter().zip(&self.dims).zip(&self.periods) {
            let c = if periodic {
                c.rem_euclid(extent)
            } else if (0..extent).contains(&c) {
                c
            } else {
                return Err(Status::ERR_ARG);
            };
            rank = rank * i64::from(extent) + i64::from(c);
        }
        Rank::try_from(rank).map_err(|_| Status::ERR_ARG)
    }
}

#[derive(Debug, Clone)]
struct Context {
    /// World ranks; the index is the rank inside this context.
    members: Vec<usize>,
    cart: Option<CartLayout>,
    released_by: Vec<usize>,
}

impl Context {
    fn group(members: Vec<usize>) -> Self {
        Self {
            members,
            cart: None,
            released_by: Vec::new(),
        }
    }

    fn position(&self, world_rank: usize) -> TransportResult<usize> {
        if self.released_by.contains(&world_rank) {
            return Err(Status::ERR_COMM);
        }
        self.members
            .iter()
            .position(|&m| m == world_rank)
            .ok_or(Status::ERR_COMM)
    }

    fn cart(&self) -> TransportResult<&CartLayout> {
        self.cart.as_ref().ok_or(Status::ERR_TOPOLOGY)
    }

    fn peer(&self, rank: Rank) -> TransportResult<usize> {
        usize::try_from(rank)
            .ok()
            .filter(|&r| r < self.members.len())
            .ok_or(Status::ERR_RANK)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CreationKey {
    parent: u64,
    /// `SELF` differs per rank, so creations on it are keyed by creator.
    owner: Option<usize>,
    seq: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CreationArgs {
    Dup,
    Cart {
        dims: Vec<i32>,
        periods: Vec<bool>,
    },
}

#[derive(Debug)]
struct Creation {
    child: LocalComm,
    args: CreationArgs,
    /// Members of the parent; the entry is dropped once all of them resolved it.
    expected: usize,
    arrivals: usize,
}

/// (context, source rank, destination rank, tag), ranks relative to the context.
type MailKey = (u64, usize, usize, i32);

#[derive(Debug)]
struct Message {
    kind: ElementKind,
    count: i32,
    payload: Bytes,
}

#[derive(Debug)]
struct Shared {
    size: usize,
    contexts: DashMap<u64, Context>,
    creations: DashMap<CreationKey, Creation>,
    sequence: DashMap<(usize, u64), u64>,
    next_id: AtomicU64,
    mailbox: Mutex<HashMap<MailKey, VecDeque<Message>>>,
    delivered: Condvar,
    aborted: AtomicBool,
    releases: Mutex<Vec<(usize, LocalComm)>>,
}

impl Shared {
    /// Mark the world as torn down and wake every rank blocked in a receive.
    fn tear_down(&self) {
        {
            let _mailbox = self.mailbox.lock();
            self.aborted.store(true, Ordering::Release);
        }
        self.delivered.notify_all();
    }
}

/// A simulated world of ranks sharing one process.
#[derive(Debug, Clone)]
pub struct LocalWorld {
    shared: Arc<Shared>,
}

impl LocalWorld {
    /// Create a world of `size` ranks.
    ///
    /// # Panics
    ///
    /// Panics if `size == 0`.
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "a local world needs at least one rank");
        Self {
            shared: Arc::new(Shared {
                size,
                contexts: DashMap::new(),
                creations: DashMap::new(),
                sequence: DashMap::new(),
                next_id: AtomicU64::new(LocalComm::FIRST_DYNAMIC),
                mailbox: Mutex::new(HashMap::new()),
                delivered: Condvar::new(),
                aborted: AtomicBool::new(false),
                releases: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Number of ranks in the world.
    pub fn size(&self) -> usize {
        self.shared.size
    }

    /// The runtime as seen from world rank `rank`.
    ///
    /// # Panics
    ///
    /// Panics if `rank >= self.size()`.
    pub fn transport(&self, rank: usize) -> LocalTransport {
        assert!(
            rank < self.shared.size,
            "rank {rank} outside of a world of {}",
            self.shared.size
        );
        LocalTransport {
            rank,
            shared: Arc::clone(&self.shared),
        }
    }

    /// One transport per rank, in rank order.
    pub fn transports(&self) -> Vec<LocalTransport> {
        (0..self.size()).map(|rank| self.transport(rank)).collect()
    }

    /// Run `f` on every rank, each on its own scoped thread, and collect the
    /// results in rank order.
    ///
    /// A panicking rank tears the world down like [`Transport::abort`]: ranks
    /// blocked in a receive are released with [`Status::ERR_OTHER`]. Once every
    /// thread is joined, the panic of the lowest such rank is propagated.
    pub fn run<F, R>(&self, f: F) -> Vec<R>
    where
        F: Fn(LocalTransport) -> R + Sync,
        R: Send,
    {
        let outcomes: Vec<std::thread::Result<R>> = std::thread::scope(|scope| {
            let handles: Vec<_> = self
                .transports()
                .into_iter()
                .map(|transport| {
                    let f = &f;
                    let shared = Arc::clone(&self.shared);
                    let rank = transport.rank;
                    scope.spawn(move || {
                        panic::catch_unwind(AssertUnwindSafe(|| f(transport))).inspect_err(|_| {
                            log::error!("local world: rank {rank} panicked, tearing the world down");
                            shared.tear_down();
                        })
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(Err))
                .collect()
        });
        outcomes
            .into_iter()
            .map(|outcome| outcome.unwrap_or_else(|payload| panic::resume_unwind(payload)))
            .collect()
    }

    /// Every successful `comm_free` so far, as (world rank, communicator).
    pub fn releases(&self) -> Vec<(usize, LocalComm)> {
        self.shared.releases.lock().clone()
    }

    /// How many ranks released `comm`.
    pub fn release_count(&self, comm: LocalComm) -> usize {
        self.shared
            .releases
            .lock()
            .iter()
            .filter(|(_, c)| *c == comm)
            .count()
    }

    /// Number of created contexts not yet released by all of their members.
    pub fn live_contexts(&self) -> usize {
        self.shared.contexts.len()
    }

    /// `true` once any rank called `abort`.
    pub fn is_aborted(&self) -> bool {
        self.shared.aborted.load(Ordering::Acquire)
    }
}

/// One rank's view of a [`LocalWorld`].
#[derive(Debug, Clone)]
pub struct LocalTransport {
    rank: usize,
    shared: Arc<Shared>,
}

assert_impl_all!(LocalTransport: Send, Sync, Clone);
assert_impl_all!(LocalWorld: Send, Sync);

impl LocalTransport {
    /// Rank of this transport in the world communicator.
    pub fn world_rank(&self) -> usize {
        self.rank
    }

    /// Number of ranks in the world.
    pub fn world_size(&self) -> usize {
        self.shared.size
    }

    /// Snapshot of the context behind `comm`.
    fn context(&self, comm: LocalComm) -> TransportResult<Context> {
        match comm {
            LocalComm::NULL => Err(Status::ERR_COMM),
            LocalComm::WORLD => Ok(Context::group((0..self.shared.size).collect())),
            LocalComm::SELF => Ok(Context::group(vec![self.rank])),
            LocalComm(id) => self
                .shared
                .contexts
                .get(&id)
                .map(|ctx| ctx.clone())
                .ok_or(Status::ERR_COMM),
        }
    }

    fn next_creation_key(&self, parent: LocalComm) -> CreationKey {
        let owner = (parent == LocalComm::SELF).then_some(self.rank);
        let mut seq = self.shared.sequence.entry((self.rank, parent.0)).or_insert(0);
        let key = CreationKey {
            parent: parent.0,
            owner,
            seq: *seq,
        };
        *seq += 1;
        key
    }

    /// Resolve this rank's next creation on `parent`, registering the child
    /// context if this rank is the first to get there. `expected` is the size
    /// of the parent group.
    fn create(
        &self,
        parent: LocalComm,
        args: CreationArgs,
        expected: usize,
        members: Vec<usize>,
        cart: Option<CartLayout>,
    ) -> TransportResult<LocalComm> {
        let key = self.next_creation_key(parent);
        let shared = &self.shared;
        let mut creation = shared.creations.entry(key).or_insert_with(|| {
            let child = LocalComm(shared.next_id.fetch_add(1, Ordering::Relaxed));
            log::debug!(
                "local world: rank {} registers {child:?} from {parent:?} ({} members)",
                self.rank,
                members.len()
            );
            shared.contexts.insert(
                child.0,
                Context {
                    members,
                    cart,
                    released_by: Vec::new(),
                },
            );
            Creation {
                child,
                args: args.clone(),
                expected,
                arrivals: 0,
            }
        });
        creation.arrivals += 1;
        let child = creation.child;
        let matches = creation.args == args;
        let complete = creation.arrivals == creation.expected;
        drop(creation);
        if complete {
            shared.creations.remove(&key);
        }
        if matches { Ok(child) } else { Err(Status::ERR_ARG) }
    }

    fn post(&self, key: MailKey, message: Message) {
        let mut mailbox = self.shared.mailbox.lock();
        mailbox.entry(key).or_default().push_back(message);
        drop(mailbox);
        self.shared.delivered.notify_all();
    }

    fn wait_for(&self, key: MailKey) -> TransportResult<Message> {
        let mut mailbox = self.shared.mailbox.lock();
        loop {
            if self.shared.aborted.load(Ordering::Acquire) {
                return Err(Status::ERR_OTHER);
            }
            if let Some(queue) = mailbox.get_mut(&key) {
                if let Some(message) = queue.pop_front() {
                    if queue.is_empty() {
                        mailbox.remove(&key);
                    }
                    return Ok(message);
                }
            }
            self.shared.delivered.wait(&mut mailbox);
        }
    }
}

fn byte_len(count: i32, kind: ElementKind) -> TransportResult<usize> {
    usize::try_from(count)
        .map(|count| count * kind.size_in_bytes())
        .map_err(|_| Status::ERR_COUNT)
}

impl Transport for LocalTransport {
    type Handle = LocalComm;

    fn world(&self) -> LocalComm {
        LocalComm::WORLD
    }

    fn comm_self(&self) -> LocalComm {
        LocalComm::SELF
    }

    fn null(&self) -> LocalComm {
        LocalComm::NULL
    }

    fn comm_rank(&self, comm: LocalComm) -> TransportResult<Rank> {
        let ctx = self.context(comm)?;
        Ok(ctx.position(self.rank)? as Rank)
    }

    fn comm_size(&self, comm: LocalComm) -> TransportResult<i32> {
        let ctx = self.context(comm)?;
        ctx.position(self.rank)?;
        Ok(ctx.members.len() as i32)
    }

    fn comm_dup(&self, comm: LocalComm) -> TransportResult<LocalComm> {
        let ctx = self.context(comm)?;
        ctx.position(self.rank)?;
        let expected = ctx.members.len();
        self.create(comm, CreationArgs::Dup, expected, ctx.members, ctx.cart)
    }

    fn comm_free(&self, comm: LocalComm) -> TransportResult<()> {
        if self.is_builtin(comm) {
            return Err(Status::ERR_COMM);
        }
        let drained = {
            let mut ctx = self.shared.contexts.get_mut(&comm.0).ok_or(Status::ERR_COMM)?;
            ctx.position(self.rank)?;
            ctx.released_by.push(self.rank);
            ctx.released_by.len() == ctx.members.len()
        };
        self.shared.releases.lock().push((self.rank, comm));
        if drained {
            self.shared.contexts.remove(&comm.0);
            self.shared.sequence.retain(|&(_, parent), _| parent != comm.0);
            log::debug!("local world: {comm:?} released by all members");
        }
        Ok(())
    }

    fn topo_test(&self, comm: LocalComm) -> TransportResult<bool> {
        let ctx = self.context(comm)?;
        ctx.position(self.rank)?;
        Ok(ctx.cart.is_some())
    }

    fn cartdim_get(&self, comm: LocalComm) -> TransportResult<i32> {
        let ctx = self.context(comm)?;
        ctx.position(self.rank)?;
        Ok(ctx.cart()?.dims.len() as i32)
    }

    fn cart_create(
        &self,
        comm: LocalComm,
        dims: &[i32],
        periods: &[bool],
        _reorder: bool,
    ) -> TransportResult<LocalComm> {
        let parent = self.context(comm)?;
        let me = parent.position(self.rank)?;
        if dims.len() != periods.len() {
            return Err(Status::ERR_ARG);
        }
        if dims.iter().any(|&d| d <= 0) {
            return Err(Status::ERR_DIMS);
        }
        let grid_size = dims
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d as usize))
            .filter(|&p| p <= parent.members.len())
            .ok_or(Status::ERR_DIMS)?;

        let layout = CartLayout {
            dims: dims.to_vec(),
            periods: periods.to_vec(),
        };
        let args = CreationArgs::Cart {
            dims: layout.dims.clone(),
            periods: layout.periods.clone(),
        };
        let members = parent.members[..grid_size].to_vec();
        let child = self.create(comm, args, parent.members.len(), members, Some(layout))?;
        Ok(if me < grid_size { child } else { LocalComm::NULL })
    }

    fn cart_get(
        &self,
        comm: LocalComm,
        dims: &mut [i32],
        periods: &mut [bool],
        coords: &mut [i32],
    ) -> TransportResult<()> {
        let ctx = self.context(comm)?;
        let me = ctx.position(self.rank)?;
        let cart = ctx.cart()?;
        let n = cart.dims.len();
        if dims.len() < n || periods.len() < n || coords.len() < n {
            return Err(Status::ERR_ARG);
        }
        dims[..n].copy_from_slice(&cart.dims);
        periods[..n].copy_from_slice(&cart.periods);
        cart.coords_of(me, &mut coords[..n]);
        Ok(())
    }

    fn cart_coords(&self, comm: LocalComm, rank: Rank, coords: &mut [i32]) -> TransportResult<()> {
        let ctx = self.context(comm)?;
        ctx.position(self.rank)?;
        let rank = ctx.peer(rank)?;
        let cart = ctx.cart()?;
        let n = cart.dims.len();
        if coords.len() < n {
            return Err(Status::ERR_ARG);
        }
        cart.coords_of(rank, &mut coords[..n]);
        Ok(())
    }

    fn cart_rank(&self, comm: LocalComm, coords: &[i32]) -> TransportResult<Rank> {
        let ctx = self.context(comm)?;
        ctx.position(self.rank)?;
        let cart = ctx.cart()?;
        let n = cart.dims.len();
        if coords.len() < n {
            return Err(Status::ERR_ARG);
        }
        cart.rank_of(&coords[..n])
    }

    fn sendrecv(&self, comm: LocalComm, mut exchange: Exchange<'_>) -> TransportResult<()> {
        let ctx = self.context(comm)?;
        let me = ctx.position(self.rank)?;
        if exchange.tag < 0 {
            return Err(Status::ERR_TAG);
        }
        let untyped = |kind: ElementKind, count: i32| kind == ElementKind::Null && count > 0;
        if untyped(exchange.send_kind, exchange.send_count)
            || untyped(exchange.recv_kind, exchange.recv_count)
        {
            return Err(Status::ERR_TYPE);
        }
        let send_len = byte_len(exchange.send_count, exchange.send_kind)?;
        let recv_capacity = byte_len(exchange.recv_count, exchange.recv_kind)?;
        if exchange.send.len() < send_len || exchange.recv.len() < recv_capacity {
            return Err(Status::ERR_BUFFER);
        }
        let dest = exchange.dest.map(|r| ctx.peer(r)).transpose()?;
        let source = exchange.source.map(|r| ctx.peer(r)).transpose()?;

        if let Some(dest) = dest {
            self.post(
                (comm.0, me, dest, exchange.tag),
                Message {
                    kind: exchange.send_kind,
                    count: exchange.send_count,
                    payload: Bytes::copy_from_slice(&exchange.send[..send_len]),
                },
            );
        }

        if let Some(source) = source {
            let message = self.wait_for((comm.0, source, me, exchange.tag))?;
            if message.kind != exchange.recv_kind {
                return Err(Status::ERR_TYPE);
            }
            if message.count > exchange.recv_count {
                return Err(Status::ERR_TRUNCATE);
            }
            exchange.recv[..message.payload.len()].copy_from_slice(&message.payload);
        }
        Ok(())
    }

    fn abort(&self, comm: LocalComm, code: i32) -> ! {
        log::error!(
            "local world: rank {} aborts through {comm:?} with code {code}",
            self.rank
        );
        self.shared.tear_down();
        panic!("local world aborted by rank {} with code {code}", self.rank);
    }
}
