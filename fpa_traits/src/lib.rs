pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

/// Boxed error returned across the hardware boundary.
pub type HwResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Load cell under the sample holder.
pub trait LoadCell {
    /// Current mass in grams.
    fn read_mass(&mut self) -> HwResult<f64>;
}

/// In-depth sample thermocouples, shallowest first, in degrees Celsius.
pub trait SampleThermocouples {
    fn read_profile(&mut self) -> HwResult<[f64; 4]>;
}

/// Raw readings from the gas analysis train used for heat-release calculations.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GasReadings {
    pub o2_volts: f64,
    pub dpt_volts: f64,
    pub co_volts: f64,
    pub co2_volts: f64,
    pub apt_volts: f64,
    pub o2_inlet_volts: f64,
    pub rh_volts: f64,
    pub duct_tc_k: f64,
    pub ambient_tc_k: f64,
}

pub trait GasAnalyzer {
    fn read_gases(&mut self) -> HwResult<GasReadings>;
}

/// Radiant lamp power supply, commanded in volts.
pub trait LampSupply {
    /// Drive the lamps. Callers clamp to the configured bounds first.
    fn set_voltage(&mut self, volts: f64) -> HwResult<()>;
    /// Drive the lamps to zero and release the instrument.
    fn shutdown(&mut self) -> HwResult<()>;
}

impl<T: LoadCell + ?Sized> LoadCell for Box<T> {
    fn read_mass(&mut self) -> HwResult<f64> {
        (**self).read_mass()
    }
}

impl<T: SampleThermocouples + ?Sized> SampleThermocouples for Box<T> {
    fn read_profile(&mut self) -> HwResult<[f64; 4]> {
        (**self).read_profile()
    }
}

impl<T: GasAnalyzer + ?Sized> GasAnalyzer for Box<T> {
    fn read_gases(&mut self) -> HwResult<GasReadings> {
        (**self).read_gases()
    }
}

impl<T: LampSupply + ?Sized> LampSupply for Box<T> {
    fn set_voltage(&mut self, volts: f64) -> HwResult<()> {
        (**self).set_voltage(volts)
    }
    fn shutdown(&mut self) -> HwResult<()> {
        (**self).shutdown()
    }
}
