//! Utilities to start a CCP processing worker.

use std::collections::HashMap;
use std::sync::{atomic, Arc};
use std::thread;

use crossbeam::channel::{unbounded, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::ipc::BackendBuilder;
use crate::ipc::Ipc;
use crate::lang::{self, Bin, Scope};
use crate::serialize::Msg;
use crate::{CongAlg, Datapath, DatapathInfo, Error, Flow, Report, Result};

/// A handle to manage running instances of the CCP execution loop.
#[derive(Debug)]
pub struct CCPHandle {
    pub continue_listening: Arc<atomic::AtomicBool>,
    pub join_handle: thread::JoinHandle<Result<()>>,
}

impl CCPHandle {
    /// Instruct the execution loop to exit.
    pub fn kill(&self) {
        self.continue_listening
            .store(false, atomic::Ordering::SeqCst);
    }

    /// Collect the error from the thread running the CCP execution loop
    /// once it exits.
    pub fn wait(self) -> Result<()> {
        match self.join_handle.join() {
            Ok(r) => r,
            Err(_) => Err(Error::Other(String::from("call to run_inner panicked"))),
        }
    }
}

/// Main execution loop of CCP.
/// The `run` method blocks 'forever'; it only returns in two cases:
/// 1. The IPC socket is closed.
/// 2. The stop handle is cleared (see `with_stop_handle` and `CCPHandle::kill`).
///
/// Messages are handed to a fixed pool of worker threads. A flow always lands
/// on worker `sock_id % workers`, which owns it: reports for one flow are
/// handled one at a time and in order, while separate flows proceed in
/// parallel.
///
/// # Example
///
/// ```rust,no_run
/// use ccp_aimd::aimd::{Aimd, AimdConfig};
/// use ccp_aimd::ipc::{chan::Socket, BackendBuilder, Blocking};
/// use ccp_aimd::RunBuilder;
///
/// let (to_dp, _from_ccp) = crossbeam::channel::unbounded();
/// let (_to_ccp, from_dp) = crossbeam::channel::unbounded();
/// let b = BackendBuilder {
///     sock: Socket::<Blocking>::new(to_dp, from_dp),
/// };
/// let handle = RunBuilder::new(b)
///     .default_alg(Aimd::new(AimdConfig::default()))
///     .spawn_thread()
///     .run()
///     .expect("spawn ccp");
/// handle.kill();
/// handle.wait().expect("ccp exited cleanly");
/// ```
pub struct RunBuilder<I: Ipc, U, Spawnness> {
    backend_builder: BackendBuilder<I>,
    alg: U,
    workers: usize,
    stop_handle: Option<Arc<atomic::AtomicBool>>,
    _phantom: std::marker::PhantomData<Spawnness>,
}

pub struct Spawn;
pub struct NoSpawn;

impl<I: Ipc> RunBuilder<I, (), NoSpawn> {
    pub fn new(backend_builder: BackendBuilder<I>) -> Self {
        Self {
            backend_builder,
            alg: (),
            workers: 1,
            stop_handle: None,
            _phantom: Default::default(),
        }
    }
}

impl<I: Ipc, S> RunBuilder<I, (), S> {
    /// Set the congestion control algorithm. This is required to run or spawn anything.
    pub fn default_alg<A: CongAlg<I>>(self, alg: A) -> RunBuilder<I, A, S> {
        RunBuilder {
            alg,
            backend_builder: self.backend_builder,
            workers: self.workers,
            stop_handle: self.stop_handle,
            _phantom: Default::default(),
        }
    }
}

impl<I: Ipc, U, S> RunBuilder<I, U, S> {
    /// Number of worker threads flows are spread over. At least one.
    pub fn workers(self, workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            ..self
        }
    }

    /// Pass an `AtomicBool` stop handle.
    pub fn with_stop_handle(self, handle: Arc<atomic::AtomicBool>) -> Self {
        Self {
            stop_handle: Some(handle),
            ..self
        }
    }

    fn stop_handle(&mut self) -> Arc<atomic::AtomicBool> {
        self.stop_handle
            .take()
            .unwrap_or_else(|| Arc::new(atomic::AtomicBool::new(true)))
    }
}

impl<I: Ipc, U> RunBuilder<I, U, NoSpawn> {
    /// Spawn a thread which will perform the CCP execution loop. Returns
    /// a `CCPHandle`, which the caller can use to cause the execution loop
    /// to stop.
    pub fn spawn_thread(self) -> RunBuilder<I, U, Spawn> {
        RunBuilder {
            backend_builder: self.backend_builder,
            stop_handle: self.stop_handle,
            workers: self.workers,
            alg: self.alg,
            _phantom: Default::default(),
        }
    }
}

impl<I, U> RunBuilder<I, U, NoSpawn>
where
    I: Ipc,
    U: CongAlg<I> + Sync,
{
    pub fn run(mut self) -> Result<()> {
        let h = self.stop_handle();
        run_inner(h, self.backend_builder, &self.alg, self.workers)
    }
}

impl<I, U> RunBuilder<I, U, Spawn>
where
    I: Ipc,
    U: CongAlg<I> + Send + Sync + 'static,
{
    pub fn run(mut self) -> Result<CCPHandle> {
        let stop_signal = self.stop_handle();
        let bb = self.backend_builder;
        let alg = self.alg;
        let workers = self.workers;
        Ok(CCPHandle {
            continue_listening: stop_signal.clone(),
            join_handle: thread::spawn(move || run_inner(stop_signal, bb, &alg, workers)),
        })
    }
}

/// Work for the worker that owns a flow.
enum Work<I: Ipc> {
    Create(Datapath<I>, DatapathInfo),
    Report(u32, Report),
    Close(u32),
}

fn compile_programs<I: Ipc, U: CongAlg<I>>(alg: &U) -> Result<HashMap<String, (Bin, Scope)>> {
    alg.datapath_programs()
        .into_iter()
        .map(|(name, prog)| {
            lang::compile(&prog)
                .map(|compiled| (name.to_owned(), compiled))
                .map_err(|e| {
                    Error::Compile(format!("datapath program \"{}\": {}", name, e))
                })
        })
        .collect()
}

// Owns the flows pinned to this worker until the dispatcher hangs up.
fn worker<I: Ipc, U: CongAlg<I>>(id: usize, alg: &U, work: Receiver<Work<I>>) {
    let mut flows = HashMap::<u32, U::Flow>::new();
    for w in work {
        match w {
            Work::Create(control, info) => {
                if let Some(mut old) = flows.remove(&info.sock_id) {
                    debug!(sid = info.sock_id, "re-creating already created flow");
                    old.close();
                }

                debug!(
                    worker    = id,
                    sid       = info.sock_id,
                    init_cwnd = info.init_cwnd,
                    mss       = info.mss,
                    src_ip    = info.src_ip,
                    src_port  = info.src_port,
                    dst_ip    = info.dst_ip,
                    dst_port  = info.dst_port,
                    alg       = U::name(),
                    "creating new flow"
                );

                match alg.new_flow(control, info) {
                    Ok(f) => {
                        flows.insert(info.sock_id, f);
                    }
                    Err(e) => warn!(sid = info.sock_id, err = %e, "flow setup failed, abandoning flow"),
                }
            }
            Work::Report(sid, r) => match flows.get_mut(&sid) {
                Some(f) => {
                    if let Err(e) = f.on_report(sid, r) {
                        if e.is_transient() {
                            debug!(sid, err = %e, "report handling failed");
                        } else {
                            warn!(sid, err = %e, "report handling failed");
                        }
                    }
                }
                None => debug!(sid, "measurement for unknown flow"),
            },
            Work::Close(sid) => match flows.remove(&sid) {
                Some(mut f) => {
                    f.close();
                    debug!(sid, "flow closed");
                }
                None => debug!(sid, "close for unknown flow"),
            },
        }
    }
}

// Main execution inner loop of ccp.
// Blocks "forever", or until the iterator stops iterating.
//
// `run_inner()`:
// 1. compiles the algorithm's datapath programs
// 2. listens for messages from the datapath
// 3. hands each message to the worker that owns its flow
// It returns Ok(()) if it was stopped through `continue_listening`, and an
// error if a program failed to compile or the IPC channel closed.
fn run_inner<I, U>(
    continue_listening: Arc<atomic::AtomicBool>,
    backend_builder: BackendBuilder<I>,
    alg: &U,
    workers: usize,
) -> Result<()>
where
    I: Ipc,
    U: CongAlg<I> + Sync,
{
    let programs = Arc::new(compile_programs(alg)?);
    let mut b = backend_builder.build(continue_listening.clone());
    let sender = b.sender();
    info!(ipc = %I::name(), alg = U::name(), workers, "starting CCP");
    debug!(programs = ?programs.keys().collect::<Vec<_>>(), "compiled all datapath programs, ccp ready");

    crossbeam::thread::scope(|s| {
        let queues: Vec<Sender<Work<I>>> = (0..workers)
            .map(|id| {
                let (tx, rx) = unbounded();
                s.spawn(move |_| worker(id, alg, rx));
                tx
            })
            .collect();

        for msg in &mut b {
            let sid = msg.sid();
            let work = match msg {
                Msg::Cr(c) => Work::Create(
                    Datapath::new(c.sid, sender.clone(), Arc::clone(&programs)),
                    DatapathInfo {
                        sock_id: c.sid,
                        init_cwnd: c.init_cwnd,
                        mss: c.mss,
                        src_ip: c.src_ip,
                        src_port: c.src_port,
                        dst_ip: c.dst_ip,
                        dst_port: c.dst_port,
                    },
                ),
                Msg::Ms(m) if m.num_fields == 0 => Work::Close(m.sid),
                Msg::Ms(m) => Work::Report(m.sid, Report::new(m.program_uid, m.fields)),
                Msg::Ins(_) | Msg::Upd(_) => {
                    // only the datapath should receive these
                    warn!(sid, "got datapath-bound message, ignoring");
                    continue;
                }
                Msg::Other(m) => {
                    debug!(size = m.len, msg_type = m.typ, sid, "got unknown message");
                    continue;
                }
            };

            if queues[sid as usize % queues.len()].send(work).is_err() {
                return Err(Error::Channel(format!("worker for flow {} exited", sid)));
            }
        }

        Ok(())
    })
    .map_err(|_| Error::Other(String::from("ccp worker panicked")))??;

    // if the thread has been killed, return that as error
    if !continue_listening.load(atomic::Ordering::SeqCst) {
        info!("ccp shutting down");
        Ok(())
    } else {
        Err(Error::Channel(String::from("the IPC channel has closed")))
    }
}
