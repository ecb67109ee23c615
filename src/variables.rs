/// Variable registry for the evaluation service.
///
/// Defines the canonical list of atmospheric variables the pipeline knows
/// about, along with their default units and physically plausible value
/// ranges used for outlier removal. This is the single source of truth
/// for variable metadata — other modules should look variables up here
/// rather than hardcoding units or ranges.

// ---------------------------------------------------------------------------
// Variable metadata
// ---------------------------------------------------------------------------

/// Metadata for a single evaluated variable.
pub struct Variable {
    /// Short variable name used in configuration and filenames
    /// (ASCII alphanumeric, no separators).
    pub name: &'static str,
    /// Human-readable description.
    pub description: &'static str,
    /// Default unit; outlier ranges below only apply to data reported
    /// in this unit.
    pub unit: &'static str,
    /// Physically plausible value range `[low, high]`. Values outside
    /// are discarded when outlier removal is enabled.
    pub plausible_range: (f64, f64),
}

/// All variables known to the evaluation pipeline, ordered roughly by
/// domain: aerosol optics, particulate matter, trace gases, deposition.
///
/// Sources for units and ranges: AeroCom variable conventions and the
/// instrument detection limits of the contributing networks.
pub static VARIABLE_REGISTRY: &[Variable] = &[
    Variable {
        name: "od550aer",
        description: "Aerosol optical depth at 550 nm",
        unit: "1",
        plausible_range: (-0.05, 10.0),
    },
    Variable {
        name: "od550csaer",
        description: "Clear-sky aerosol optical depth at 550 nm",
        unit: "1",
        plausible_range: (-0.05, 10.0),
    },
    Variable {
        name: "absc550aer",
        description: "Aerosol absorption coefficient at 550 nm",
        unit: "1/Mm",
        plausible_range: (-10.0, 1000.0),
    },
    Variable {
        name: "scatc550aer",
        description: "Aerosol scattering coefficient at 550 nm",
        unit: "1/Mm",
        plausible_range: (-25.0, 5000.0),
    },
    Variable {
        name: "concpm10",
        description: "PM10 mass concentration",
        unit: "ug m-3",
        plausible_range: (0.0, 5000.0),
    },
    Variable {
        name: "concpm25",
        description: "PM2.5 mass concentration",
        unit: "ug m-3",
        plausible_range: (0.0, 5000.0),
    },
    Variable {
        name: "concno2",
        description: "NO2 surface concentration",
        unit: "ug m-3",
        plausible_range: (0.0, 1000.0),
    },
    Variable {
        name: "conco3",
        description: "O3 surface concentration",
        unit: "ug m-3",
        plausible_range: (0.0, 1000.0),
    },
    Variable {
        name: "concso2",
        description: "SO2 surface concentration",
        unit: "ug m-3",
        plausible_range: (0.0, 1000.0),
    },
    Variable {
        name: "wetoxs",
        description: "Wet deposition of oxidised sulphur",
        unit: "mg S m-2 d-1",
        plausible_range: (0.0, 100.0),
    },
    Variable {
        name: "wetoxn",
        description: "Wet deposition of oxidised nitrogen",
        unit: "mg N m-2 d-1",
        plausible_range: (0.0, 100.0),
    },
];

/// Looks up a variable by name. Returns `None` if not registered.
pub fn find_variable(name: &str) -> Option<&'static Variable> {
    VARIABLE_REGISTRY.iter().find(|v| v.name == name)
}

/// Default outlier range for a variable, if it is registered.
pub fn default_range(name: &str) -> Option<(f64, f64)> {
    find_variable(name).map(|v| v.plausible_range)
}

/// Default unit for a variable, if it is registered.
pub fn default_unit(name: &str) -> Option<&'static str> {
    find_variable(name).map(|v| v.unit)
}

/// True if a name satisfies the variable-name shape constraint imposed by
/// the filename encoding: non-empty, ASCII alphanumeric only.
pub fn is_valid_var_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
