pub mod days;
pub mod instance;
pub mod template;

pub use days::DaySet;
pub use instance::{AlarmInstance, InstanceState};
pub use template::{AlarmTemplate, ModeOption, PreAlarm, VolumeSetting};
