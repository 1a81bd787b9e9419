mod properties;
mod scenarios;
mod shutdown;
mod support;
mod telemetry_cadence;
