//! Thrust allocator: two-phase tableau simplex over the 4-nozzle coupling.
//!
//! The tableau is a fixed `[[f64; 8]; 5]` array — no heap allocation per
//! solve — with columns `R1..R4`, three phase-1 artificial variables, and
//! the RHS, and rows for the three equality constraints plus the two
//! carried objective rows (phase-1 and phase-2): compact, allocation-free,
//! deterministic, matching the numerical-kernel style used throughout the
//! pipeline.

const EPS: f64 = 1e-6;
const COLS: usize = 8;
const ROWS: usize = 5;
const N_VARS: usize = 4;
const M_CONSTRAINTS: usize = 3;
const RHS_COL: usize = COLS - 1;
const PHASE1_ROW: usize = 3;
const PHASE2_ROW: usize = 4;

/// Outcome of a simplex solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Status {
    /// A feasible, bounded optimum was found.
    Optimal([f64; N_VARS]),
    /// Unbounded — a programming error, treated fatal.
    Unbounded,
    /// No feasible point exists for this cycle's demand.
    Infeasible,
}

/// Build the three coupling rows for (F_theta, F_psi, M_phi) at roll `phi`.
/// Each row is negated (and its RHS made non-negative) when the
/// corresponding demand is negative, which is algebraically equivalent.
fn build_rows(f_theta: f64, f_psi: f64, m_phi: f64, phi: f64, d: f64) -> ([[f64; N_VARS]; M_CONSTRAINTS], [f64; M_CONSTRAINTS]) {
    let (s, c) = phi.sin_cos();

    let mut rows = [
        [c, -s, -c, s],
        [s, c, -s, -c],
        [d, -d, d, -d],
    ];
    let mut rhs = [f_theta, f_psi, m_phi];

    for i in 0..M_CONSTRAINTS {
        if rhs[i] < 0.0 {
            rhs[i] = -rhs[i];
            for j in 0..N_VARS {
                rows[i][j] = -rows[i][j];
            }
        }
    }

    (rows, rhs)
}

struct Tableau {
    data: [[f64; COLS]; ROWS],
    basis: [usize; M_CONSTRAINTS],
}

impl Tableau {
    fn new(rows: [[f64; N_VARS]; M_CONSTRAINTS], rhs: [f64; M_CONSTRAINTS]) -> Self {
        let mut data = [[0.0; COLS]; ROWS];
        for i in 0..M_CONSTRAINTS {
            for j in 0..N_VARS {
                data[i][j] = rows[i][j];
            }
            data[i][N_VARS + i] = 1.0;
            data[i][RHS_COL] = rhs[i];
        }

        // Phase-1 row: minimize sum(artificial) == maximize -sum(artificial).
        // Reduced cost for variable column j is sum_i A_ij (cost 0 minus z_j
        // = 0 - (-sum_i A_ij)); artificial columns start basic, reduced cost 0.
        for j in 0..N_VARS {
            data[PHASE1_ROW][j] = rows[0][j] + rows[1][j] + rows[2][j];
        }
        data[PHASE1_ROW][RHS_COL] = -(rhs[0] + rhs[1] + rhs[2]);

        // Phase-2 row: maximize -sum(R_j); artificial columns carry cost 0.
        for j in 0..N_VARS {
            data[PHASE2_ROW][j] = -1.0;
        }
        data[PHASE2_ROW][RHS_COL] = 0.0;

        Tableau {
            data,
            basis: [N_VARS, N_VARS + 1, N_VARS + 2],
        }
    }

    fn pivot(&mut self, pivot_row: usize, pivot_col: usize) {
        let pivot_val = self.data[pivot_row][pivot_col];
        for j in 0..COLS {
            self.data[pivot_row][j] /= pivot_val;
        }
        for i in 0..ROWS {
            if i == pivot_row {
                continue;
            }
            let factor = self.data[i][pivot_col];
            if factor.abs() < EPS {
                continue;
            }
            for j in 0..COLS {
                self.data[i][j] -= factor * self.data[pivot_row][j];
            }
        }
        self.basis[pivot_row] = pivot_col;
    }

    /// Run simplex iterations against `obj_row`, considering only entering
    /// columns in `0..entering_limit`. Returns `false` if the tableau is
    /// unbounded in that direction.
    fn run(&mut self, obj_row: usize, entering_limit: usize) -> bool {
        loop {
            let mut best_col = None;
            let mut best_val = EPS;
            for j in 0..entering_limit {
                if self.data[obj_row][j] > best_val {
                    best_val = self.data[obj_row][j];
                    best_col = Some(j);
                }
            }
            let Some(col) = best_col else { return true };

            let mut best_row = None;
            let mut best_ratio = f64::INFINITY;
            for i in 0..M_CONSTRAINTS {
                let a = self.data[i][col];
                if a > EPS {
                    let ratio = self.data[i][RHS_COL] / a;
                    if ratio < best_ratio - EPS {
                        best_ratio = ratio;
                        best_row = Some(i);
                    }
                }
            }
            let Some(row) = best_row else { return false };

            self.pivot(row, col);
        }
    }

    fn solution(&self) -> [f64; N_VARS] {
        let mut x = [0.0; N_VARS];
        for i in 0..M_CONSTRAINTS {
            if self.basis[i] < N_VARS {
                x[self.basis[i]] = self.data[i][RHS_COL];
            }
        }
        x
    }
}

/// Solve the 4-variable minimum-thrust allocation for demanded
/// `(f_theta, f_psi, m_phi)` at roll `phi`, clipping the result to
/// `[0, t_max]`.
pub fn allocate(f_theta: f64, f_psi: f64, m_phi: f64, phi: f64, d: f64, t_max: f64) -> Status {
    let (rows, rhs) = build_rows(f_theta, f_psi, m_phi, phi, d);
    let mut tableau = Tableau::new(rows, rhs);

    if !tableau.run(PHASE1_ROW, COLS - 1) {
        return Status::Unbounded;
    }
    if tableau.data[PHASE1_ROW][RHS_COL].abs() > 1e-6 {
        return Status::Infeasible;
    }

    if !tableau.run(PHASE2_ROW, N_VARS) {
        return Status::Unbounded;
    }

    let x = tableau.solution();
    // The equality system alone is satisfiable for any demand (opposing
    // valves can always be driven up together without changing the net
    // force/moment), so genuine infeasibility only shows up once the
    // one-sided actuator bound is considered: if the minimum-thrust
    // solution needs more than T_max on some valve, the demand cannot be
    // delivered. See DESIGN.md for this Open Question resolution.
    if x.iter().any(|&v| v > t_max + 1e-6) {
        return Status::Infeasible;
    }

    let mut x = x;
    for v in &mut x {
        *v = v.clamp(0.0, t_max);
    }
    Status::Optimal(x)
}

/// Reconstruct (F_theta, F_psi, M_phi) from an allocation, using the same
/// roll-rotation coupling table, for allocator exactness checks.
pub fn reconstruct(r: [f64; N_VARS], phi: f64, d: f64) -> (f64, f64, f64) {
    let (s, c) = phi.sin_cos();
    let f_theta = c * r[0] - s * r[1] - c * r[2] + s * r[3];
    let f_psi = s * r[0] + c * r[1] - s * r[2] - c * r[3];
    let m_phi = d * r[0] - d * r[1] + d * r[2] - d * r[3];
    (f_theta, f_psi, m_phi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pure_pitch_at_zero_roll_minimises_total_thrust() {
        // F_theta=0.2 (clipped), others 0. The roll-moment row couples all
        // four nozzles at nonzero d, so the minimum-thrust vertex uses
        // three of the four valves here (R3=0) rather than the naive
        // two-nozzle intuition for a pure pitch demand.
        let status = allocate(0.2, 0.0, 0.0, 0.0, 0.005, 0.2);
        match status {
            Status::Optimal(r) => {
                assert!(r[2].abs() < 1e-6, "r3 should be exactly 0, r={r:?}");
                assert!((r[0] - 0.2).abs() < 1e-3, "r={r:?}");
                assert!((r[1] - 0.1).abs() < 1e-3, "r={r:?}");
                assert!((r[3] - 0.1).abs() < 1e-3, "r={r:?}");
                let (f_theta, f_psi, m_phi) = reconstruct(r, 0.0, 0.005);
                assert!((f_theta - 0.2).abs() < 1e-3);
                assert!(f_psi.abs() < 1e-3);
                assert!(m_phi.abs() < 1e-3);
            }
            other => panic!("expected optimal, got {other:?}"),
        }
    }

    #[test]
    fn roll_pi_over_2_still_minimises_total_thrust() {
        let phi = std::f64::consts::FRAC_PI_2;
        let status = allocate(0.1, 0.0, 0.0, phi, 0.005, 0.2);
        match status {
            Status::Optimal(r) => {
                assert!(r[1].abs() < 1e-6, "r2 should be exactly 0, r={r:?}");
                let (f_theta, f_psi, m_phi) = reconstruct(r, phi, 0.005);
                assert!((f_theta - 0.1).abs() < 1e-3);
                assert!(f_psi.abs() < 1e-3);
                assert!(m_phi.abs() < 1e-3);
            }
            other => panic!("expected optimal, got {other:?}"),
        }
    }

    #[test]
    fn infeasible_demand_falls_back_cleanly() {
        // Far beyond T_max capability.
        let status = allocate(10.0, 10.0, 10.0, 0.0, 0.005, 0.2);
        assert_eq!(status, Status::Infeasible);
    }

    #[test]
    fn exactness_within_feasible_polytope() {
        let phi = 0.3;
        let d = 0.005;
        let t_max = 0.2;
        let status = allocate(0.05, -0.03, 0.0005, phi, d, t_max);
        match status {
            Status::Optimal(r) => {
                let (f_theta, f_psi, m_phi) = reconstruct(r, phi, d);
                assert!((f_theta - 0.05).abs() < 1e-3, "f_theta={f_theta}");
                assert!((f_psi - (-0.03)).abs() < 1e-3, "f_psi={f_psi}");
                assert!((m_phi - 0.0005).abs() < 1e-3, "m_phi={m_phi}");
            }
            other => panic!("expected optimal, got {other:?}"),
        }
    }

    #[test]
    fn at_least_one_zero_thrust_after_allocation() {
        for phi in [0.0, 0.3, 1.0, std::f64::consts::FRAC_PI_2] {
            let status = allocate(0.05, 0.02, 0.0003, phi, 0.005, 0.2);
            if let Status::Optimal(r) = status {
                assert!(r.iter().any(|&v| v.abs() < 1e-4), "phi={phi} r={r:?}");
            }
        }
    }

    #[test]
    fn zero_demand_yields_zero_thrust() {
        let status = allocate(0.0, 0.0, 0.0, 0.0, 0.005, 0.2);
        assert_eq!(status, Status::Optimal([0.0; 4]));
    }

    #[test]
    fn saturation_at_exact_t_max_drives_one_valve_to_limit() {
        let status = allocate(0.2, 0.0, 0.0, 0.0, 0.005, 0.2);
        match status {
            Status::Optimal(r) => {
                assert!(r.iter().any(|&v| (v - 0.2).abs() < 1e-3), "r={r:?}");
            }
            other => panic!("expected optimal, got {other:?}"),
        }
    }
}
