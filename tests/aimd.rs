mod common;

use common::{MSS, WAIT};

#[test]
fn increase_then_halve() -> anyhow::Result<()> {
    let mut h = common::start(1);
    h.open(1, MSS)?;
    assert_eq!(h.cwnd(1), 14600);

    // one window acked without loss: one mss of growth
    let t = h.epoch(1, 0, 10, 14600, 0)?;
    h.expect_cwnd(1, 16060)?;

    let t = h.epoch(1, t, 10, 14600, 1)?;
    h.expect_cwnd(1, 8030)?;

    // growth floors at the initial window
    h.epoch(1, t, 2, 100, 0)?;
    h.expect_cwnd(1, 14600)?;

    {
        let lines = h.diag.lock().unwrap();
        assert_eq!(lines.len(), 6);
        assert!(lines[0].starts_with("now="));
        assert!(lines[0].ends_with(&format!(" rtt={} ", common::RTT)));
        assert_eq!(lines[1], "rate=1000000");
    }

    h.host.close_flow(1)?;
    h.stop()
}

#[test]
fn many_losses_keep_window_positive() -> anyhow::Result<()> {
    let mut h = common::start(1);
    h.open(1, MSS)?;

    let mut t = 0;
    let mut cwnd = 14600;
    for _ in 0..5 {
        t = h.epoch(1, t, 4, 4 * 1460, 1)?;
        cwnd /= 2;
        h.expect_cwnd(1, cwnd)?;
    }

    assert_eq!(h.cwnd(1), 456);
    assert!(!h.host.connection(1).map_or(true, |c| c.can_send(0)));
    h.stop()
}

#[test]
fn recreate_resets_window() -> anyhow::Result<()> {
    let mut h = common::start(1);
    h.open(1, MSS)?;
    h.epoch(1, 0, 10, 14600, 0)?;
    h.expect_cwnd(1, 16060)?;

    h.open(1, 1000)?;
    assert_eq!(h.cwnd(1), 10000);
    h.host.poll_until(WAIT / 10, |_| false).unwrap_or(());
    assert_eq!(h.cwnd(1), 10000);
    h.stop()
}
