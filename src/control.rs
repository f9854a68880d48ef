//! Control law, thrust allocation, and PWM dispatch, run from a single
//! periodic thread.
//!
//! `T_control` both computes the demand/allocation and drives the
//! dispatcher inline — there is no separate dispatcher thread.

use crate::allocator::{self, Status};
use crate::config::{Config, ControlGains};
use crate::dispatcher::Dispatcher;
use crate::error::GncError;
use crate::pwm;
use crate::shared::{ActiveFlag, FaultLatch, PeriodicTimer, QuitFlag, Snapshot};
use crate::types::{AttitudeSnapshot, ControlDemand, SparsityTag, ThrustAssignment};
use std::sync::Arc;
use std::time::Duration;

/// Compute `(F_theta, F_psi, M_phi)` from a coherent attitude snapshot,
/// with references nominally zero and the pre-allocator bound
/// `|F| <= T_max`, `|M_phi| <= 2*d*T_max`.
pub fn compute_demand(
    snapshot: &AttitudeSnapshot,
    gains: &ControlGains,
    t_max: f64,
    d: f64,
) -> ControlDemand {
    let f_theta = (gains.k_theta * snapshot.theta_f + gains.td_theta * snapshot.theta_dot_f)
        .clamp(-t_max, t_max);
    let f_psi = (gains.k_psi * snapshot.psi_f + gains.td_psi * snapshot.psi_dot_f)
        .clamp(-t_max, t_max);
    let m_phi_bound = 2.0 * d * t_max;
    let m_phi = (gains.k_phi * snapshot.omega_x).clamp(-m_phi_bound, m_phi_bound);

    ControlDemand {
        host_time: snapshot.host_time,
        f_theta,
        f_psi,
        m_phi,
    }
}

/// Tag whichever single `Rᵢ` landed at exactly zero — the minimum-thrust
/// allocation always leaves at least one valve at zero.
fn sparsity_tag(r: [f64; 4]) -> SparsityTag {
    const EPS: f64 = 1e-6;
    let zeros: Vec<usize> = r
        .iter()
        .enumerate()
        .filter(|(_, v)| v.abs() < EPS)
        .map(|(i, _)| i)
        .collect();
    match zeros.as_slice() {
        [] => SparsityTag::None,
        [0] => SparsityTag::R1,
        [1] => SparsityTag::R2,
        [2] => SparsityTag::R3,
        [3] => SparsityTag::R4,
        _ => SparsityTag::Multiple,
    }
}

/// Run the allocator and PWM linearisation for one control tick. An
/// infeasible allocation falls back to all-zero thrust (recoverable); an
/// unbounded report is a fatal programming error.
pub fn allocate_and_linearize(
    demand: &ControlDemand,
    phi: f64,
    d: f64,
    t_max: f64,
    table: &[crate::config::ValvePoint],
) -> Result<ThrustAssignment, GncError> {
    match allocator::allocate(demand.f_theta, demand.f_psi, demand.m_phi, phi, d, t_max) {
        Status::Optimal(r) => Ok(ThrustAssignment {
            host_time: demand.host_time,
            r,
            pwm: pwm::linearize_all(r, table),
            sparsity: sparsity_tag(r),
            infeasible: false,
        }),
        Status::Infeasible => {
            log::warn!("allocator: infeasible demand, commanding zero thrust this cycle");
            let mut assignment = ThrustAssignment::zero(demand.host_time);
            assignment.infeasible = true;
            Ok(assignment)
        }
        Status::Unbounded => Err(GncError::SimplexUnbounded),
    }
}

/// Spawn the control thread: runs at `control_period_us`, reads the
/// latest attitude snapshot, computes and publishes the control demand and
/// thrust assignment, appends to `control_log`, and drives `dispatcher`
/// directly — sending the linearised PWM frame while `active` is set, and
/// an all-zero frame otherwise (§4.7: "only Active-window enables the
/// dispatcher output").
pub fn spawn(
    cfg: &Config,
    attitude_snapshot: Arc<Snapshot<AttitudeSnapshot>>,
    control_demand: Arc<Snapshot<ControlDemand>>,
    thrust_assignment: Arc<Snapshot<ThrustAssignment>>,
    mut dispatcher: Dispatcher,
    active: ActiveFlag,
    quit: QuitFlag,
    fault: FaultLatch,
    mut control_log: crate::textlog::TextLog,
) -> std::io::Result<std::thread::JoinHandle<()>> {
    let cfg = cfg.clone();
    std::thread::Builder::new()
        .name("gnc-control".into())
        .spawn(move || {
            let mut timer = PeriodicTimer::new(Duration::from_micros(cfg.raw.control_period_us));

            while !quit.is_set() {
                let snapshot = attitude_snapshot.get();
                let demand = compute_demand(&snapshot, &cfg.raw.gains, cfg.raw.t_max, cfg.raw.d);
                control_demand.publish(demand);

                match allocate_and_linearize(
                    &demand,
                    snapshot.phi_f,
                    cfg.raw.d,
                    cfg.raw.t_max,
                    &cfg.raw.valve_table,
                ) {
                    Ok(thrust) => {
                        let _ = control_log.append_control_row(&demand, &thrust);
                        thrust_assignment.publish(thrust);

                        let send_result = if active.is_active() {
                            dispatcher.send(thrust.pwm)
                        } else {
                            dispatcher.send_zero()
                        };
                        if let Err(e) = send_result {
                            log::error!("control: dispatcher fault: {e}");
                            fault.raise(e);
                            break;
                        }
                    }
                    Err(e) => {
                        log::error!("control: fatal condition: {e}");
                        fault.raise(e);
                        break;
                    }
                }

                if !timer.tick() {
                    log::info!("control: loop overrun");
                }
            }

            let _ = dispatcher.send_zero();
            log::info!("control thread exiting");
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn snapshot_with(theta_f: f64, psi_f: f64, omega_x: f64) -> AttitudeSnapshot {
        let mut s = AttitudeSnapshot::zero(Instant::now());
        s.theta_f = theta_f;
        s.psi_f = psi_f;
        s.omega_x = omega_x;
        s
    }

    #[test]
    fn pure_pitch_demand_clips_to_t_max() {
        // 20 degrees of pitch error.
        let gains = ControlGains {
            k_theta: 5.0,
            td_theta: 3.0,
            k_psi: 5.0,
            td_psi: 3.0,
            k_phi: 1.0,
        };
        let snapshot = snapshot_with(0.3491, 0.0, 0.0);
        let demand = compute_demand(&snapshot, &gains, 0.2, 0.005);
        assert!((demand.f_theta - 0.2).abs() < 1e-9, "f_theta={}", demand.f_theta);
        assert_eq!(demand.f_psi, 0.0);
        assert_eq!(demand.m_phi, 0.0);
    }

    #[test]
    fn roll_moment_bound_is_twice_offset_times_t_max() {
        let gains = ControlGains {
            k_theta: 0.0,
            td_theta: 0.0,
            k_psi: 0.0,
            td_psi: 0.0,
            k_phi: 100.0,
        };
        let snapshot = snapshot_with(0.0, 0.0, 10.0);
        let demand = compute_demand(&snapshot, &gains, 0.2, 0.005);
        assert!((demand.m_phi - 2.0 * 0.005 * 0.2).abs() < 1e-9);
    }

    #[test]
    fn infeasible_allocation_falls_back_to_zero_thrust() {
        let demand = ControlDemand {
            host_time: Instant::now(),
            f_theta: 10.0,
            f_psi: 10.0,
            m_phi: 10.0,
        };
        let table = crate::config::test_config().raw.valve_table;
        let thrust = allocate_and_linearize(&demand, 0.0, 0.005, 0.2, &table).unwrap();
        assert!(thrust.infeasible);
        assert_eq!(thrust.r, [0.0; 4]);
        assert_eq!(thrust.pwm, [0; 4]);
    }

    #[test]
    fn sparsity_tag_identifies_the_single_zero_channel() {
        assert_eq!(sparsity_tag([0.0, 1.0, 2.0, 3.0]), SparsityTag::R1);
        assert_eq!(sparsity_tag([1.0, 0.0, 2.0, 3.0]), SparsityTag::R2);
        assert_eq!(sparsity_tag([1.0, 2.0, 3.0, 4.0]), SparsityTag::None);
        assert_eq!(sparsity_tag([0.0, 0.0, 1.0, 2.0]), SparsityTag::Multiple);
    }
}
