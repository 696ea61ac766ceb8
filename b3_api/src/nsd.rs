//! CVM RAD document addressing.
//!
//! Every regulatory filing published through CVM's RAD system is identified
//! by a sequential document number (NSD). Statement scrapers resolve an NSD to
//! the filing page below.

/// Base URL of the CVM RAD (ENET) system.
pub const CVM_RAD_BASE_URL: &str = "https://www.rad.cvm.gov.br/ENET";

/// Returns the filing page URL for an NSD.
pub fn nsd_document_url(nsd: u64) -> String {
    format!(
        "{}/frmGerenciaPaginaFRE.aspx?NumeroSequencialDocumento={}&CodigoTipoInstituicao=1",
        CVM_RAD_BASE_URL, nsd
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_document_url() {
        assert_eq!(
            nsd_document_url(123456),
            "https://www.rad.cvm.gov.br/ENET/frmGerenciaPaginaFRE.aspx?NumeroSequencialDocumento=123456&CodigoTipoInstituicao=1"
        );
    }
}
