use chemfetch_core::error::EngineError;

/// Converts a SMILES string into the molblock (MDL connection table) text
/// some submission forms require.
///
/// Real conversion needs a chemistry toolkit and is out of this crate's
/// scope; callers inject an implementation backed by whatever toolkit they
/// run. An invalid structure surfaces as an error, which the owning job's
/// fetch reports at stage `"encode"`.
pub trait StructureEncoder: Send + Sync {
    fn molblock(&self, smiles: &str) -> Result<String, EngineError>;
}

/// Passthrough encoder: submits the SMILES text itself in place of a
/// molblock, for servers that accept SMILES input directly.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityEncoder;

impl StructureEncoder for IdentityEncoder {
    fn molblock(&self, smiles: &str) -> Result<String, EngineError> {
        Ok(smiles.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_encoder_passes_smiles_through() {
        let encoder = IdentityEncoder;
        assert_eq!(
            encoder.molblock("CC(=O)OC1=CC=CC=C1C(=O)O").unwrap(),
            "CC(=O)OC1=CC=CC=C1C(=O)O"
        );
    }
}
