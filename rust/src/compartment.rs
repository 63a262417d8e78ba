//! Disease compartments of the SEIR model.
//!
//! The seven compartments have a fixed order which is also the order of the
//! first axis of every state tensor produced by the integrator.

/// One stage of the disease progression, or the cumulative incidence counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Compartment {
    Susceptible,
    Exposed,
    Infectious1,
    Infectious2,
    Infectious3,
    Recovered,
    /// Monotone counter, not a population state.
    CumulativeIncidence,
}

impl Compartment {
    pub const COUNT: usize = 7;

    pub const ALL: [Compartment; Compartment::COUNT] = [
        Compartment::Susceptible,
        Compartment::Exposed,
        Compartment::Infectious1,
        Compartment::Infectious2,
        Compartment::Infectious3,
        Compartment::Recovered,
        Compartment::CumulativeIncidence,
    ];

    /// Compartments holding people; these move along mobility edges and sum
    /// to the node population.
    pub const POPULATION: [Compartment; 6] = [
        Compartment::Susceptible,
        Compartment::Exposed,
        Compartment::Infectious1,
        Compartment::Infectious2,
        Compartment::Infectious3,
        Compartment::Recovered,
    ];

    /// Position along the compartment axis of state arrays.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Label used in exported tables.
    pub fn label(&self) -> &'static str {
        match self {
            Compartment::Susceptible => "S",
            Compartment::Exposed => "E",
            Compartment::Infectious1 => "I1",
            Compartment::Infectious2 => "I2",
            Compartment::Infectious3 => "I3",
            Compartment::Recovered => "R",
            Compartment::CumulativeIncidence => "cumI",
        }
    }
}

/// Row label of the exported long-format table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RowLabel {
    Compartment(Compartment),
    /// Day-over-day difference of cumulative incidence.
    DailyIncidence,
}

impl RowLabel {
    pub const COUNT: usize = Compartment::COUNT + 1;

    /// All export rows for a single day, in output order.
    pub fn all() -> impl Iterator<Item = RowLabel> {
        Compartment::ALL
            .into_iter()
            .map(RowLabel::Compartment)
            .chain(std::iter::once(RowLabel::DailyIncidence))
    }

    pub fn label(&self) -> &'static str {
        match self {
            RowLabel::Compartment(c) => c.label(),
            RowLabel::DailyIncidence => "diffI",
        }
    }
}
