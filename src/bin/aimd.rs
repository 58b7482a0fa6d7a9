use clap::Arg;
use tracing::{info, warn};

use ccp_aimd::aimd::{Aimd, AimdConfig, INIT_CWND_PKTS};
use ccp_aimd::diag::Diagnostics;
use ccp_aimd::ipc::BackendBuilder;
use ccp_aimd::RunBuilder;

struct Args {
    ipc: String,
    bind: String,
    datapath: String,
    workers: usize,
    cfg: AimdConfig,
}

fn make_args() -> Result<Args, String> {
    let init_cwnd_default = format!("{}", INIT_CWND_PKTS);
    let matches = clap::App::new("CCP AIMD")
        .version("0.1.0")
        .about("Additive-increase multiplicative-decrease congestion control")
        .arg(
            Arg::with_name("ipc")
                .long("ipc")
                .help("Sets the type of ipc to use: (unix)")
                .default_value("unix")
                .validator(ccp_aimd::algs::ipc_valid),
        )
        .arg(
            Arg::with_name("bind")
                .long("bind")
                .help("Name of the socket CCP listens on, under /tmp/ccp")
                .default_value("ccp"),
        )
        .arg(
            Arg::with_name("datapath")
                .long("datapath")
                .help("Name of the datapath's socket, under /tmp/ccp")
                .default_value("datapath"),
        )
        .arg(
            Arg::with_name("workers")
                .long("workers")
                .help("Number of threads flows are spread over")
                .default_value("1")
                .validator(ccp_aimd::algs::positive_int),
        )
        .arg(
            Arg::with_name("init_cwnd_pkts")
                .long("init-cwnd-pkts")
                .help("Sets the initial congestion window, in packets")
                .default_value(&init_cwnd_default)
                .validator(ccp_aimd::algs::positive_int),
        )
        .arg(
            Arg::with_name("diagnostics")
                .long("diagnostics")
                .help("Where per-report diagnostic lines go: (stdout|off)")
                .default_value("stdout")
                .possible_values(&["stdout", "off"]),
        )
        .get_matches();

    let value = |name: &str| {
        matches
            .value_of(name)
            .map(String::from)
            .ok_or_else(|| format!("missing argument {}", name))
    };

    Ok(Args {
        ipc: value("ipc")?,
        bind: value("bind")?,
        datapath: value("datapath")?,
        workers: value("workers")?.parse().map_err(|e| format!("{}", e))?,
        cfg: AimdConfig {
            init_cwnd_pkts: value("init_cwnd_pkts")?
                .parse()
                .map_err(|e| format!("{}", e))?,
            diagnostics: value("diagnostics")?.parse::<Diagnostics>()?,
        },
    })
}

fn main() {
    ccp_aimd::algs::init_tracing();
    let args = match make_args() {
        Ok(a) => a,
        Err(e) => {
            warn!(err = %e, "bad argument");
            std::process::exit(1);
        }
    };

    info!(
        ipc = %args.ipc,
        bind = %args.bind,
        workers = args.workers,
        init_cwnd_pkts = args.cfg.init_cwnd_pkts,
        "starting CCP AIMD"
    );
    let res = match args.ipc.as_str() {
        "unix" => {
            use ccp_aimd::ipc::unix::Socket;
            use ccp_aimd::ipc::Blocking;
            let b = Socket::<Blocking>::new(&args.bind, &args.datapath)
                .map(|sock| BackendBuilder { sock })
                .expect("ipc initialization");
            RunBuilder::new(b)
                .default_alg(Aimd::new(args.cfg))
                .workers(args.workers)
                .run()
        }
        _ => unreachable!(),
    };

    if let Err(e) = res {
        warn!(err = %e, "ccp exited");
        std::process::exit(1);
    }
}
