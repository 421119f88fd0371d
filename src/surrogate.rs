//! Analytic surface-mounted PM machine used by the `run` subcommand.
//!
//! Closed-form stand-ins for the field solver: a sleeve retention check,
//! a loss estimate and an efficiency/mass summary. Good enough to drive a
//! campaign end to end; not a design tool.

use mach_opt::{
    AnalysisStage, Architect, EvaluationPipeline, ObjectiveVector, StageContext, StageError,
    StageOutcome,
};
use serde::Serialize;
use std::f64::consts::PI;
use std::fs;
use std::path::PathBuf;

const RHO_MAGNET: f64 = 7500.0;
const RHO_SLEEVE: f64 = 1600.0;
const RHO_STEEL: f64 = 7650.0;
const RHO_COPPER: f64 = 8960.0;
const AIRGAP: f64 = 0.001;

/// Free variables, in order: sleeve thickness, rotor radius, magnet
/// thickness (all metres) and stator tooth-width ratio.
pub const VARIABLES: [&str; 4] = ["d_sleeve", "r_rotor", "d_magnet", "tooth_ratio"];

#[derive(Debug, Clone, Serialize)]
pub struct SpmDesign {
    pub d_sleeve: f64,
    pub r_rotor: f64,
    pub d_magnet: f64,
    pub tooth_ratio: f64,
    pub stack_length: f64,
    pub speed_rpm: f64,
    pub electric_loading: f64,
}

impl SpmDesign {
    fn omega(&self) -> f64 {
        self.speed_rpm * 2.0 * PI / 60.0
    }

    fn stator_inner_radius(&self) -> f64 {
        self.r_rotor + self.d_magnet + self.d_sleeve + AIRGAP
    }
}

pub struct SpmArchitect {
    pub stack_length: f64,
    pub speed_rpm: f64,
    pub electric_loading: f64,
}

impl Default for SpmArchitect {
    fn default() -> Self {
        Self {
            stack_length: 0.05,
            speed_rpm: 20_000.0,
            electric_loading: 3.0e4,
        }
    }
}

impl Architect for SpmArchitect {
    type Design = SpmDesign;

    fn create_design(&self, x: &[f64]) -> SpmDesign {
        SpmDesign {
            d_sleeve: x[0],
            r_rotor: x[1],
            d_magnet: x[2],
            tooth_ratio: x[3],
            stack_length: self.stack_length,
            speed_rpm: self.speed_rpm,
            electric_loading: self.electric_loading,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SpmState {
    pub design: SpmDesign,
    pub sleeve_stress: Option<f64>,
    pub output_power: Option<f64>,
    pub losses: Option<f64>,
    pub efficiency: Option<f64>,
    pub mass: Option<f64>,
    pub magnet_mass: Option<f64>,
}

impl From<SpmDesign> for SpmState {
    fn from(design: SpmDesign) -> Self {
        Self {
            design,
            sleeve_stress: None,
            output_power: None,
            losses: None,
            efficiency: None,
            mass: None,
            magnet_mass: None,
        }
    }
}

/// Hoop stress of a thin sleeve retaining the magnets.
pub struct Structural {
    pub max_stress: f64,
}

impl AnalysisStage<SpmState> for Structural {
    type Problem = SpmDesign;
    type Results = f64;

    fn name(&self) -> &str {
        "structural"
    }

    fn build_problem(&self, state: &SpmState, _: &StageContext) -> Result<SpmDesign, StageError> {
        Ok(state.design.clone())
    }

    fn run(&self, d: SpmDesign, _: &StageContext) -> Result<StageOutcome<f64>, StageError> {
        let r = d.r_rotor + d.d_magnet;
        let areal_mass = RHO_MAGNET * d.d_magnet + RHO_SLEEVE * d.d_sleeve;
        Ok(StageOutcome::Accepted(
            areal_mass * d.omega().powi(2) * r * r / d.d_sleeve,
        ))
    }

    fn post_process(
        &self,
        stress: f64,
        state: &SpmState,
    ) -> Result<StageOutcome<SpmState>, StageError> {
        if stress > self.max_stress {
            return Ok(StageOutcome::Rejected(format!(
                "sleeve stress {:.3e} Pa exceeds {:.3e} Pa",
                stress, self.max_stress
            )));
        }
        Ok(StageOutcome::Accepted(SpmState {
            sleeve_stress: Some(stress),
            ..state.clone()
        }))
    }
}

#[derive(Debug, Serialize)]
pub struct LossProblem {
    design: SpmDesign,
    airgap_flux_density: f64,
}

#[derive(Debug, Serialize)]
pub struct LossResults {
    output_power: f64,
    copper: f64,
    iron: f64,
    windage: f64,
}

/// Torque, copper, iron and windage losses at rated speed.
///
/// Writes its input deck to the evaluation's working directory, the way
/// a field-solver adapter would.
pub struct Losses;

impl AnalysisStage<SpmState> for Losses {
    type Problem = LossProblem;
    type Results = LossResults;

    fn name(&self) -> &str {
        "losses"
    }

    fn build_problem(&self, state: &SpmState, ctx: &StageContext) -> Result<LossProblem, StageError> {
        let d = &state.design;
        let magnetic_gap = d.d_magnet + d.d_sleeve + AIRGAP;
        let problem = LossProblem {
            design: d.clone(),
            airgap_flux_density: 1.2 * d.d_magnet / magnetic_gap,
        };
        let deck: PathBuf = ctx.work_dir().join("loss_problem.json");
        fs::write(&deck, serde_json::to_vec_pretty(&problem)?)?;
        Ok(problem)
    }

    fn run(&self, p: LossProblem, ctx: &StageContext) -> Result<StageOutcome<LossResults>, StageError> {
        let d = &p.design;
        let b = p.airgap_flux_density;
        let r = d.stator_inner_radius();
        let torque = 2.0 * PI * r * r * d.stack_length * b * d.electric_loading / 2.0_f64.sqrt();
        let output_power = torque * d.omega();

        let slot_fill = 1.0 - d.tooth_ratio;
        let copper = 1.7e-8 * d.electric_loading.powi(2) * 2.0 * PI * r * d.stack_length
            / (slot_fill * 0.01);
        let f_elec = d.speed_rpm / 60.0 * 2.0;
        let tooth_b = b / d.tooth_ratio;
        let steel_volume = PI * ((r + 0.03).powi(2) - r * r) * d.stack_length;
        let iron = 2.0e-3 * f_elec.powf(1.5) * tooth_b.powi(2) * steel_volume * RHO_STEEL;
        let windage = 0.5 * 1.2 * 0.004 * d.omega().powi(3) * r.powi(4) * d.stack_length * PI;

        let results = LossResults {
            output_power,
            copper,
            iron,
            windage,
        };
        fs::write(
            ctx.work_dir().join("loss_results.json"),
            serde_json::to_vec_pretty(&results)?,
        )?;
        Ok(StageOutcome::Accepted(results))
    }

    fn post_process(
        &self,
        r: LossResults,
        state: &SpmState,
    ) -> Result<StageOutcome<SpmState>, StageError> {
        Ok(StageOutcome::Accepted(SpmState {
            output_power: Some(r.output_power),
            losses: Some(r.copper + r.iron + r.windage),
            ..state.clone()
        }))
    }
}

/// Efficiency and active mass.
pub struct Efficiency {
    pub min_efficiency: f64,
}

impl AnalysisStage<SpmState> for Efficiency {
    type Problem = (SpmDesign, f64, f64);
    type Results = (f64, f64, f64);

    fn name(&self) -> &str {
        "efficiency"
    }

    fn build_problem(
        &self,
        state: &SpmState,
        _: &StageContext,
    ) -> Result<(SpmDesign, f64, f64), StageError> {
        match (state.output_power, state.losses) {
            (Some(p), Some(l)) => Ok((state.design.clone(), p, l)),
            _ => Err(StageError::Tool(
                "efficiency stage needs the loss stage to run first".into(),
            )),
        }
    }

    fn run(
        &self,
        (d, power, losses): (SpmDesign, f64, f64),
        _: &StageContext,
    ) -> Result<StageOutcome<(f64, f64, f64)>, StageError> {
        let efficiency = power / (power + losses);
        let r_mag = d.r_rotor + d.d_magnet;
        let magnet_mass = PI * (r_mag.powi(2) - d.r_rotor.powi(2)) * d.stack_length * RHO_MAGNET;
        let rotor_mass = PI * d.r_rotor.powi(2) * d.stack_length * RHO_STEEL;
        let r_si = d.stator_inner_radius();
        let stator_mass = PI * ((r_si + 0.03).powi(2) - r_si.powi(2)) * d.stack_length * RHO_STEEL;
        let copper_mass = 2.0 * PI * r_si * 0.02 * (1.0 - d.tooth_ratio) * d.stack_length * RHO_COPPER;
        let mass = magnet_mass + rotor_mass + stator_mass + copper_mass;
        Ok(StageOutcome::Accepted((efficiency, mass, magnet_mass)))
    }

    fn post_process(
        &self,
        (efficiency, mass, magnet_mass): (f64, f64, f64),
        state: &SpmState,
    ) -> Result<StageOutcome<SpmState>, StageError> {
        if efficiency < self.min_efficiency {
            return Ok(StageOutcome::Rejected(format!(
                "efficiency {efficiency:.4} below {:.4}",
                self.min_efficiency
            )));
        }
        Ok(StageOutcome::Accepted(SpmState {
            efficiency: Some(efficiency),
            mass: Some(mass),
            magnet_mass: Some(magnet_mass),
            ..state.clone()
        }))
    }
}

/// `[-power density (kW/kg), -efficiency, magnet mass share]`.
pub fn objectives(state: &SpmState) -> StageOutcome<ObjectiveVector> {
    match (state.output_power, state.efficiency, state.mass, state.magnet_mass) {
        (Some(power), Some(efficiency), Some(mass), Some(magnet)) if mass > 0.0 => {
            StageOutcome::Accepted(vec![-(power / 1e3) / mass, -efficiency, magnet / mass])
        }
        _ => StageOutcome::Rejected("incomplete analysis state".into()),
    }
}

pub type SurrogatePipeline =
    EvaluationPipeline<SpmArchitect, SpmState, fn(&SpmState) -> StageOutcome<ObjectiveVector>>;

pub fn pipeline(bad_fitness: ObjectiveVector, work_dir: impl Into<PathBuf>) -> SurrogatePipeline {
    EvaluationPipeline::new(
        SpmArchitect::default(),
        objectives as fn(&SpmState) -> StageOutcome<ObjectiveVector>,
        bad_fitness,
        work_dir,
    )
    .with_stage(Structural { max_stress: 1.2e8 })
    .with_stage(Losses)
    .with_stage(Efficiency {
        min_efficiency: 0.85,
    })
}
