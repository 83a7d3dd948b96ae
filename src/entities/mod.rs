pub mod anomaly;
pub mod computed_window;
pub mod job_log;
pub mod turbine_data;
pub mod turbine_watermark;

pub mod prelude {
    pub use super::anomaly::Entity as Anomaly;
    pub use super::computed_window::Entity as ComputedWindow;
    pub use super::job_log::Entity as JobLog;
    pub use super::turbine_data::Entity as TurbineData;
    pub use super::turbine_watermark::Entity as TurbineWatermark;
}
