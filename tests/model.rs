// POWERCAP POWER/THROUGHPUT MODEL TESTS
// CLOSED-FORM CURVE FITS AND THE TABLE INTERPOLATION BUILT ON THEM
//
// PURE ARITHMETIC. NO ENGINE, NO HARDWARE.

use powercap::model::{ModelTables, PowerCurve, ThroughputCurve, PSTATE_HIGH};
use powercap::{Configuration, FrequencyTable};

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

// === POWER CURVE ===

#[test]
fn power_curve_matches_closed_form() {
    let (ph, fh, pl, fl, uncore) = (50.0, 3.0, 20.0, 1.0, 5.0);
    let curve = PowerCurve::fit(ph, fh, pl, fl, uncore).unwrap();

    // SAME ALGEBRA, WRITTEN OUT
    let (ph, pl) = (ph - uncore, pl - uncore);
    let alpha = (pl * fh - ph * fl) / (fl.powi(3) * fh - fh.powi(3) * fl);
    let beta = (pl * fh.powi(3) - ph * fl.powi(3)) / (fl * fh.powi(3) - fh * fl.powi(3));
    let want = alpha * 8.0 + beta * 2.0 + uncore;

    assert!(close(curve.predict(2.0), want));
    // 45W/15W ABOVE UNCORE AT 3x/1x: PURELY LINEAR, 35W AT 2x
    assert!(close(curve.predict(2.0), 35.0));
}

#[test]
fn power_curve_reproduces_boundaries() {
    for (ph, pl) in [(62.0, 21.0), (118.5, 40.25), (30.0, 29.0)] {
        let c = PowerCurve::fit(ph, 3400.0, pl, 800.0, 7.5).unwrap();
        assert!(close(c.predict(3400.0), ph));
        assert!(close(c.predict(800.0), pl));
    }
}

#[test]
fn power_curve_rejects_equal_or_zero_frequencies() {
    assert!(PowerCurve::fit(50.0, 2000.0, 20.0, 2000.0, 0.0).is_none());
    assert!(PowerCurve::fit(50.0, 2000.0, 20.0, 0.0, 0.0).is_none());
}

// === THROUGHPUT CURVE ===

#[test]
fn throughput_curve_monotone_between_boundaries() {
    let c = ThroughputCurve::fit(1800.0, 3000.0, 700.0, 1000.0).unwrap();
    assert!(close(c.predict(3000.0), 1800.0));
    assert!(close(c.predict(1000.0), 700.0));
    // HIGHER FREQUENCY, HIGHER PREDICTED THROUGHPUT
    let mut last = c.predict(1000.0);
    for f in [1500.0, 2000.0, 2500.0, 3000.0] {
        let v = c.predict(f);
        assert!(v > last);
        last = v;
    }
}

#[test]
fn throughput_curve_rejects_zero_low_boundary() {
    assert!(ThroughputCurve::fit(1800.0, 3000.0, 0.0, 1000.0).is_none());
}

// === TABLES ===

fn freqs() -> FrequencyTable {
    FrequencyTable::parse("3100000 3000000 2500000 2000000 1500000 1000000").unwrap()
}

fn filled(total: usize) -> ModelTables {
    let f = freqs();
    let max = f.max_pstate();
    let mut m = ModelTables::new(max, total);
    for t in 1..=total {
        let tf = t as f64;
        m.record(Configuration::new(t, max), 10.0 + 2.0 * tf, 100.0 * tf);
        m.record(Configuration::new(t, PSTATE_HIGH), 10.0 + 12.0 * tf, 270.0 * tf);
    }
    m
}

#[test]
fn fit_keeps_boundary_rows() {
    let mut m = filled(4);
    let report = m.fit(&freqs(), 10.0);
    assert!(report.skipped_power.is_empty());
    assert!(report.skipped_throughput.is_empty());
    for t in 1..=4 {
        let tf = t as f64;
        assert!(close(m.power.get(5, t), 10.0 + 2.0 * tf));
        assert!(close(m.power.get(PSTATE_HIGH, t), 10.0 + 12.0 * tf));
        assert!(close(m.throughput.get(5, t), 100.0 * tf));
        assert!(close(m.throughput.get(PSTATE_HIGH, t), 270.0 * tf));
    }
}

#[test]
fn fit_interpolates_between_boundaries() {
    let mut m = filled(4);
    m.fit(&freqs(), 10.0);
    for t in 1..=4 {
        for p in 2..5 {
            let pw = m.power.get(p, t);
            assert!(pw < m.power.get(p - 1, t));
            assert!(pw > m.power.get(p + 1, t));
            let tp = m.throughput.get(p, t);
            assert!(tp < m.throughput.get(p - 1, t));
            assert!(tp > m.throughput.get(p + 1, t));
        }
    }
    // BOOST ROW (P-STATE 0) IS NEVER MODELED
    assert_eq!(m.power.get(0, 1), 0.0);
}

#[test]
fn select_picks_highest_throughput_under_limit() {
    let mut m = filled(4);
    m.fit(&freqs(), 10.0);
    // P-STATE 1 AT 3 THREADS IS 46W, AT 4 THREADS 58W
    let sel = m.select(50.0);
    assert!(sel.power < 50.0);
    for p in PSTATE_HIGH..=5 {
        for t in 1..=4 {
            if m.power.get(p, t) < 50.0 {
                assert!(m.throughput.get(p, t) <= sel.throughput);
            }
        }
    }
}

#[test]
fn select_falls_back_to_floor_when_nothing_fits() {
    let mut m = filled(4);
    m.fit(&freqs(), 10.0);
    let sel = m.select(1.0);
    assert_eq!(sel.config, Configuration::new(1, 5));
}
