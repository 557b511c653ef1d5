use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::error::{BenchError, Result};

/// Tag of the single root element of an MSCCL algorithm file
pub const ROOT_TAG: &str = "algo";

/// Attributes of the `<algo>` element of one MSCCL XML file.
///
/// Example: `{'name': 'Allgather(n=16)-...', 'nchannels': '8', 'proto': 'Simple', 'ngpus': '16', 'coll': 'allgather', 'inplace': '1'}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlgorithmDescriptor {
    attributes: BTreeMap<String, String>,
}

impl AlgorithmDescriptor {
    /// Parse the XML text of a descriptor and keep the root element's attributes.
    pub fn parse(xml: &str) -> Result<Self> {
        let doc = roxmltree::Document::parse(xml)
            .map_err(|e| BenchError::Descriptor(format!("malformed XML: {}", e)))?;
        let root = doc.root_element();
        if root.tag_name().name() != ROOT_TAG {
            return Err(BenchError::Descriptor(format!(
                "root element is <{}>, expected <{}>",
                root.tag_name().name(),
                ROOT_TAG
            )));
        }

        let attributes = root
            .attributes()
            .map(|a| (a.name().to_string(), a.value().to_string()))
            .collect();
        Ok(Self { attributes })
    }

    /// Read and parse a descriptor file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents).map_err(|e| match e {
            BenchError::Descriptor(msg) => BenchError::Descriptor(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    fn require(&self, name: &str) -> Result<&str> {
        self.get(name)
            .ok_or_else(|| BenchError::Descriptor(format!("`{}` attribute not found", name)))
    }

    /// Collective name as written in the file (e.g. `allgather`)
    pub fn coll(&self) -> Result<&str> {
        self.require("coll")
    }

    pub fn proto(&self) -> Result<&str> {
        self.require("proto")
    }

    pub fn name(&self) -> Result<&str> {
        self.require("name")
    }

    /// Number of GPUs (= MPI ranks) the algorithm was synthesized for.
    pub fn ngpus(&self) -> Result<u32> {
        let raw = self.require("ngpus")?;
        match raw.trim().parse::<u32>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(BenchError::Descriptor(format!(
                "`ngpus` must be a positive integer, got `{}`",
                raw
            ))),
        }
    }

    /// Whether the algorithm runs in-place (`inplace="1"`) or out-of-place (`inplace="0"`).
    pub fn inplace(&self) -> Result<bool> {
        match self.require("inplace")?.trim() {
            "0" => Ok(false),
            "1" => Ok(true),
            other => Err(BenchError::Descriptor(format!(
                "`inplace` must be 0 or 1, got `{}`",
                other
            ))),
        }
    }

    pub fn collective(&self) -> Result<Collective> {
        Collective::from_msccl_name(self.coll()?)
    }
}

/// Collectives with a known nccl-tests binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collective {
    AllReduce,
    AllGather,
    AllToAll,
}

impl Collective {
    /// MSCCL and nccl-tests name collectives differently; only these conversions are known.
    pub fn from_msccl_name(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "allreduce" => Ok(Collective::AllReduce),
            "allgather" => Ok(Collective::AllGather),
            "alltoall" => Ok(Collective::AllToAll),
            _ => Err(BenchError::UnsupportedAlgorithm(name.to_string())),
        }
    }

    /// Name of the nccl-tests executable under `nccl-tests/build`
    pub fn perf_binary(self) -> &'static str {
        match self {
            Collective::AllReduce => "all_reduce_perf",
            Collective::AllGather => "all_gather_perf",
            Collective::AllToAll => "alltoall_perf",
        }
    }

    pub fn msccl_name(self) -> &'static str {
        match self {
            Collective::AllReduce => "allreduce",
            Collective::AllGather => "allgather",
            Collective::AllToAll => "alltoall",
        }
    }
}

impl fmt::Display for Collective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.msccl_name())
    }
}
