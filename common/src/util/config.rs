use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub delay: DelayConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RouterConfig {
    #[serde(default = "default_max_trials")]
    pub max_trials: usize,
    #[serde(default = "default_alpha_wld")]
    pub alpha_wld: f64,
    #[serde(default = "default_alpha_td")]
    pub alpha_td: f64,
    #[serde(default = "default_initial_pres_fac")]
    pub initial_pres_fac: f64,
    #[serde(default = "default_pres_fac_mult")]
    pub pres_fac_mult: f64,
    #[serde(default = "default_acc_fac")]
    pub acc_fac: f64,
    #[serde(default = "default_reroute_criticality")]
    pub reroute_criticality: f64,
    #[serde(default = "default_usage_multiplier")]
    pub usage_multiplier: f64,
    #[serde(default = "default_bb_margin")]
    pub bb_margin: i32,
    #[serde(default = "default_fix_opins_from_trial")]
    pub fix_opins_from_trial: usize,
    #[serde(default = "default_opin_fix_min_fanout")]
    pub opin_fix_min_fanout: usize,
    #[serde(default = "default_timing_driven")]
    pub timing_driven: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_trials: default_max_trials(),
            alpha_wld: default_alpha_wld(),
            alpha_td: default_alpha_td(),
            initial_pres_fac: default_initial_pres_fac(),
            pres_fac_mult: default_pres_fac_mult(),
            acc_fac: default_acc_fac(),
            reroute_criticality: default_reroute_criticality(),
            usage_multiplier: default_usage_multiplier(),
            bb_margin: default_bb_margin(),
            fix_opins_from_trial: default_fix_opins_from_trial(),
            opin_fix_min_fanout: default_opin_fix_min_fanout(),
            timing_driven: default_timing_driven(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TimingConfig {
    #[serde(default = "default_criticality_exponent")]
    pub criticality_exponent: f64,
    #[serde(default = "default_max_criticality")]
    pub max_criticality: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            criticality_exponent: default_criticality_exponent(),
            max_criticality: default_max_criticality(),
        }
    }
}

/// Delays in nanoseconds.
#[derive(Debug, Deserialize, Clone)]
pub struct DelayConfig {
    #[serde(default = "default_cell_delay")]
    pub cell_delay: f64,
    #[serde(default = "default_interconnect_delay")]
    pub interconnect_delay: f64,
    #[serde(default = "default_wire_delay_per_tile")]
    pub wire_delay_per_tile: f64,
    #[serde(default = "default_sll_delay")]
    pub sll_delay: f64,
    #[serde(default = "default_setup")]
    pub setup: f64,
    #[serde(default = "default_clock_to_q")]
    pub clock_to_q: f64,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            cell_delay: default_cell_delay(),
            interconnect_delay: default_interconnect_delay(),
            wire_delay_per_tile: default_wire_delay_per_tile(),
            sll_delay: default_sll_delay(),
            setup: default_setup(),
            clock_to_q: default_clock_to_q(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneratorConfig {
    #[serde(default = "default_dies")]
    pub dies: usize,
    #[serde(default = "default_die_width")]
    pub die_width: u32,
    #[serde(default = "default_die_height")]
    pub die_height: u32,
    #[serde(default = "default_channel_width")]
    pub channel_width: u32,
    #[serde(default = "default_inputs_per_block")]
    pub inputs_per_block: u32,
    #[serde(default = "default_utilization")]
    pub utilization: f64,
    #[serde(default = "default_max_fanout")]
    pub max_fanout: usize,
    #[serde(default = "default_clock_domains")]
    pub clock_domains: usize,
    #[serde(default = "default_registered_fraction")]
    pub registered_fraction: f64,
    #[serde(default = "default_cross_die_fraction")]
    pub cross_die_fraction: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            dies: default_dies(),
            die_width: default_die_width(),
            die_height: default_die_height(),
            channel_width: default_channel_width(),
            inputs_per_block: default_inputs_per_block(),
            utilization: default_utilization(),
            max_fanout: default_max_fanout(),
            clock_domains: default_clock_domains(),
            registered_fraction: default_registered_fraction(),
            cross_die_fraction: default_cross_die_fraction(),
            seed: default_seed(),
        }
    }
}

fn default_max_trials() -> usize {
    100
}

fn default_alpha_wld() -> f64 {
    1.0
}

fn default_alpha_td() -> f64 {
    1.0
}

fn default_initial_pres_fac() -> f64 {
    0.5
}

fn default_pres_fac_mult() -> f64 {
    2.0
}

fn default_acc_fac() -> f64 {
    1.0
}

fn default_reroute_criticality() -> f64 {
    0.85
}

fn default_usage_multiplier() -> f64 {
    1.0
}

fn default_bb_margin() -> i32 {
    3
}

fn default_fix_opins_from_trial() -> usize {
    4
}

fn default_opin_fix_min_fanout() -> usize {
    2
}

fn default_timing_driven() -> bool {
    true
}

fn default_criticality_exponent() -> f64 {
    3.0
}

fn default_max_criticality() -> f64 {
    0.99
}

fn default_cell_delay() -> f64 {
    0.25
}

fn default_interconnect_delay() -> f64 {
    0.02
}

fn default_wire_delay_per_tile() -> f64 {
    0.08
}

fn default_sll_delay() -> f64 {
    1.0
}

fn default_setup() -> f64 {
    0.1
}

fn default_clock_to_q() -> f64 {
    0.15
}

fn default_dies() -> usize {
    2
}

fn default_die_width() -> u32 {
    8
}

fn default_die_height() -> u32 {
    8
}

fn default_channel_width() -> u32 {
    8
}

fn default_inputs_per_block() -> u32 {
    4
}

fn default_utilization() -> f64 {
    0.6
}

fn default_max_fanout() -> usize {
    4
}

fn default_clock_domains() -> usize {
    2
}

fn default_registered_fraction() -> f64 {
    0.5
}

fn default_cross_die_fraction() -> f64 {
    0.1
}

fn default_seed() -> u64 {
    1
}
