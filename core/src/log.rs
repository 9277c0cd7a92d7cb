//! # Logging to Output Streams
//!
//! [`StreamLogger`] writes the events of an optimization run as colored lines to any
//! [`WriteColor`] stream.

use std::{fmt, time::Duration};

use anyhow::anyhow;
use cpu_time::ProcessTime;
use rustsat::solvers::SolverResult;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::WriteSolverLog;

/// Selects the events a [`StreamLogger`] writes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoggerConfig {
    pub log_oracle_calls: bool,
    pub log_cores: bool,
    pub log_costs: bool,
    pub log_strata: bool,
    pub log_solutions: bool,
    /// Depth of nested routines to log starts and ends of
    pub log_routines: usize,
}

impl LoggerConfig {
    /// Configuration logging every event
    pub fn all() -> Self {
        LoggerConfig {
            log_oracle_calls: true,
            log_cores: true,
            log_costs: true,
            log_strata: true,
            log_solutions: true,
            log_routines: usize::MAX,
        }
    }
}

/// Logger writing events to a stream
pub struct StreamLogger<W> {
    out: W,
    config: LoggerConfig,
    routine_stack: Vec<(&'static str, ProcessTime)>,
}

impl StreamLogger<StandardStream> {
    /// Creates a logger writing to standard output
    pub fn stdout(config: LoggerConfig, color: ColorChoice) -> Self {
        Self::new(StandardStream::stdout(color), config)
    }
}

impl<W: WriteColor> StreamLogger<W> {
    pub fn new(out: W, config: LoggerConfig) -> Self {
        StreamLogger {
            out,
            config,
            routine_stack: vec![],
        }
    }

    /// Gets the underlying stream back
    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_event(
        &mut self,
        event: &str,
        color: Color,
        args: fmt::Arguments<'_>,
    ) -> anyhow::Result<()> {
        self.out.set_color(ColorSpec::new().set_fg(Some(color)))?;
        write!(self.out, "{event}")?;
        self.out.reset()?;
        writeln!(self.out, ": {args}")?;
        Ok(())
    }
}

impl<W: WriteColor> WriteSolverLog for StreamLogger<W> {
    fn log_oracle_call(&mut self, result: SolverResult) -> anyhow::Result<()> {
        if self.config.log_oracle_calls {
            self.write_event(
                "oracle call",
                Color::Magenta,
                format_args!(
                    "result: {}; cpu-time: {}",
                    result,
                    DurPrinter::new(ProcessTime::now().as_duration())
                ),
            )?;
        }
        Ok(())
    }

    fn log_core(&mut self, weight: usize, len: usize, red_len: usize) -> anyhow::Result<()> {
        if self.config.log_cores {
            self.write_event(
                "extracted core",
                Color::Magenta,
                format_args!("weight: {weight}; original-len: {len}; reduced-len: {red_len}"),
            )?;
        }
        Ok(())
    }

    fn log_am1(&mut self, len: usize, weight: usize) -> anyhow::Result<()> {
        if self.config.log_cores {
            self.write_event(
                "at-most-one",
                Color::Magenta,
                format_args!("len: {len}; weight: {weight}"),
            )?;
        }
        Ok(())
    }

    fn log_core_exhaustion(&mut self, exhausted: usize, weight: usize) -> anyhow::Result<()> {
        if self.config.log_cores {
            self.write_event(
                "exhausted core",
                Color::Magenta,
                format_args!("exhausted: {exhausted}; weight: {weight}"),
            )?;
        }
        Ok(())
    }

    fn log_cost(&mut self, cost: usize) -> anyhow::Result<()> {
        if self.config.log_costs {
            self.write_event(
                "lower bound",
                Color::Cyan,
                format_args!(
                    "cost: {}; cpu-time: {}",
                    cost,
                    DurPrinter::new(ProcessTime::now().as_duration())
                ),
            )?;
        }
        Ok(())
    }

    fn log_stratum(&mut self, weight: usize, n_lits: usize) -> anyhow::Result<()> {
        if self.config.log_strata {
            self.write_event(
                "stratum",
                Color::Cyan,
                format_args!("weight: {weight}; n-lits: {n_lits}"),
            )?;
        }
        Ok(())
    }

    fn log_hardening(&mut self, n_hardened: usize) -> anyhow::Result<()> {
        if self.config.log_strata {
            self.write_event(
                "hardened",
                Color::Cyan,
                format_args!("n-lits: {n_hardened}"),
            )?;
        }
        Ok(())
    }

    fn log_solution(&mut self, cost: usize) -> anyhow::Result<()> {
        if self.config.log_solutions {
            self.write_event(
                "solution",
                Color::Magenta,
                format_args!(
                    "cost: {}; cpu-time: {}",
                    cost,
                    DurPrinter::new(ProcessTime::now().as_duration())
                ),
            )?;
        }
        Ok(())
    }

    fn log_routine_start(&mut self, desc: &'static str) -> anyhow::Result<()> {
        self.routine_stack.push((desc, ProcessTime::now()));

        if self.config.log_routines >= self.routine_stack.len() {
            self.write_event(">>> routine start", Color::Green, format_args!("{desc}"))?;
        }
        Ok(())
    }

    fn log_routine_end(&mut self) -> anyhow::Result<()> {
        let (desc, start) = self
            .routine_stack
            .pop()
            .ok_or_else(|| anyhow!("routine stack out of sync"))?;

        if self.config.log_routines > self.routine_stack.len() {
            let duration = ProcessTime::now().duration_since(start);
            self.write_event(
                "<<< routine end",
                Color::Red,
                format_args!("{}; duration: {}", desc, DurPrinter::new(duration)),
            )?;
        }
        Ok(())
    }

    fn log_end_solve(&mut self) -> anyhow::Result<()> {
        while !self.routine_stack.is_empty() {
            self.log_routine_end()?;
        }
        self.out.flush()?;
        Ok(())
    }

    fn log_message(&mut self, msg: &str) -> anyhow::Result<()> {
        writeln!(self.out, "{msg}")?;
        Ok(())
    }
}

struct DurPrinter {
    dur: Duration,
}

impl DurPrinter {
    fn new(dur: Duration) -> Self {
        Self { dur }
    }
}

impl fmt::Display for DurPrinter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.dur)
    }
}

#[cfg(test)]
mod tests {
    use rustsat::solvers::SolverResult;
    use termcolor::NoColor;

    use super::{LoggerConfig, StreamLogger};
    use crate::WriteSolverLog;

    fn written(logger: StreamLogger<NoColor<Vec<u8>>>) -> String {
        String::from_utf8(logger.into_inner().into_inner()).unwrap()
    }

    #[test]
    fn filters_events() {
        let config = LoggerConfig {
            log_cores: true,
            ..Default::default()
        };
        let mut logger = StreamLogger::new(NoColor::new(vec![]), config);
        logger.log_oracle_call(SolverResult::Sat).unwrap();
        logger.log_core(3, 4, 2).unwrap();
        logger.log_cost(3).unwrap();
        logger.log_am1(3, 2).unwrap();
        assert_eq!(
            written(logger),
            "extracted core: weight: 3; original-len: 4; reduced-len: 2\n\
             at-most-one: len: 3; weight: 2\n"
        );
    }

    #[test]
    fn routine_depth() {
        let config = LoggerConfig {
            log_routines: 1,
            ..Default::default()
        };
        let mut logger = StreamLogger::new(NoColor::new(vec![]), config);
        logger.log_routine_start("outer").unwrap();
        logger.log_routine_start("inner").unwrap();
        logger.log_end_solve().unwrap();
        let out = written(logger);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], ">>> routine start: outer");
        assert!(lines[1].starts_with("<<< routine end: outer; duration: "));
    }

    #[test]
    fn unbalanced_routine_end() {
        let mut logger = StreamLogger::new(NoColor::new(vec![]), LoggerConfig::default());
        assert!(logger.log_routine_end().is_err());
    }
}
