use std::env;
use std::time::Duration;

use crate::datatypes::{AssigningAuthority, IdCategory};

/// Which backend resolves patient identifiers against the MPI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverBackend {
    Pix,
    Fhir,
    Internal,
}

#[derive(Debug, Clone)]
pub struct PnrConfig {
    /// Route requests through the pre-parse stage.
    pub send_parse_orchestration: bool,
    /// Resolve and rewrite healthcare-worker identifiers.
    pub providers_enrich: bool,
    /// Resolve and rewrite facility identifiers.
    pub facilities_enrich: bool,
    /// Register unknown patients through the identity feed.
    pub patients_auto_register: bool,
}

#[derive(Debug, Clone)]
pub struct FhirConfig {
    pub mpi_url: String,
    pub mpi_client_name: String,
    pub mpi_password: String,
    /// Identifier system URI that marks the enterprise id on MPI Patient
    /// resources.
    pub enterprise_system: String,
}

#[derive(Debug, Clone)]
pub struct PixConfig {
    pub manager_host: String,
    pub manager_port: u16,
    pub sending_application: String,
    pub sending_facility: String,
    pub receiving_application: String,
    pub receiving_facility: String,
}

/// Target enterprise authorities, one per identifier category.
#[derive(Debug, Clone)]
pub struct RequestedAuthorities {
    pub ecid: AssigningAuthority,
    pub epid: AssigningAuthority,
    pub elid: AssigningAuthority,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub pnr: PnrConfig,
    pub fhir: FhirConfig,
    pub pix: PixConfig,
    pub requested: RequestedAuthorities,
    pub patient_resolver: ResolverBackend,
    pub resolve_timeout: Duration,
    pub transaction_timeout: Duration,
    pub dsub_consumer_urls: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|e| format!("Invalid SERVER_PORT: {}", e))?;

        let pnr = PnrConfig {
            send_parse_orchestration: env_bool("PNR_SEND_PARSE_ORCHESTRATION", false)?,
            providers_enrich: env_bool("PNR_PROVIDERS_ENRICH", true)?,
            facilities_enrich: env_bool("PNR_FACILITIES_ENRICH", true)?,
            patients_auto_register: env_bool("PNR_PATIENTS_AUTO_REGISTER", false)?,
        };

        let fhir = FhirConfig {
            mpi_url: env::var("FHIR_MPI_URL")
                .unwrap_or_else(|_| "http://localhost:8080/fhir".to_string()),
            mpi_client_name: env::var("FHIR_MPI_CLIENT_NAME").unwrap_or_default(),
            mpi_password: env::var("FHIR_MPI_PASSWORD").unwrap_or_default(),
            enterprise_system: env::var("FHIR_ENTERPRISE_SYSTEM")
                .unwrap_or_else(|_| "http://openclientregistry.org/fhir/sourceid".to_string()),
        };

        let pix = PixConfig {
            manager_host: env::var("PIX_MANAGER_HOST").unwrap_or_else(|_| "localhost".to_string()),
            manager_port: env::var("PIX_MANAGER_PORT")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .map_err(|e| format!("Invalid PIX_MANAGER_PORT: {}", e))?,
            sending_application: env::var("PIX_SENDING_APPLICATION")
                .unwrap_or_else(|_| "xdsgate".to_string()),
            sending_facility: env::var("PIX_SENDING_FACILITY")
                .unwrap_or_else(|_| "xdsgate".to_string()),
            receiving_application: env::var("PIX_RECEIVING_APPLICATION")
                .unwrap_or_else(|_| "pix".to_string()),
            receiving_facility: env::var("PIX_RECEIVING_FACILITY")
                .unwrap_or_else(|_| "pix".to_string()),
        };

        let requested = RequestedAuthorities {
            ecid: env_authority("CLIENT_REQUESTED_ECID", "ECID"),
            epid: env_authority("CLIENT_REQUESTED_EPID", "EPID"),
            elid: env_authority("CLIENT_REQUESTED_ELID", "ELID"),
        };

        let patient_resolver = match env::var("PATIENT_RESOLVER")
            .unwrap_or_else(|_| "pix".to_string())
            .as_str()
        {
            "pix" => ResolverBackend::Pix,
            "fhir" => ResolverBackend::Fhir,
            "internal" => ResolverBackend::Internal,
            other => return Err(format!("Invalid PATIENT_RESOLVER: {}", other)),
        };

        let resolve_timeout = Duration::from_secs(env_u64("RESOLVE_TIMEOUT_SECS", 60)?);
        let transaction_timeout = Duration::from_secs(env_u64("TRANSACTION_TIMEOUT_SECS", 120)?);

        let dsub_consumer_urls = env::var("DSUB_CONSUMER_URLS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Config {
            server_host,
            server_port,
            pnr,
            fhir,
            pix,
            requested,
            patient_resolver,
            resolve_timeout,
            transaction_timeout,
            dsub_consumer_urls,
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    /// The enterprise authority a category resolves into.
    pub fn target_authority(&self, category: IdCategory) -> &AssigningAuthority {
        match category {
            IdCategory::Patient => &self.requested.ecid,
            IdCategory::Provider => &self.requested.epid,
            IdCategory::Facility => &self.requested.elid,
        }
    }

    /// Whether resolution is enabled for a category. Patients are always
    /// resolved; providers and facilities follow their enrich flags.
    pub fn category_enabled(&self, category: IdCategory) -> bool {
        match category {
            IdCategory::Patient => true,
            IdCategory::Provider => self.pnr.providers_enrich,
            IdCategory::Facility => self.pnr.facilities_enrich,
        }
    }
}

fn env_bool(key: &str, default: bool) -> Result<bool, String> {
    match env::var(key) {
        Ok(v) => v
            .parse()
            .map_err(|_| format!("Invalid {}: expected true/false, got {}", key, v)),
        Err(_) => Ok(default),
    }
}

fn env_u64(key: &str, default: u64) -> Result<u64, String> {
    match env::var(key) {
        Ok(v) => v.parse().map_err(|e| format!("Invalid {}: {}", key, e)),
        Err(_) => Ok(default),
    }
}

fn env_authority(prefix: &str, default: &str) -> AssigningAuthority {
    AssigningAuthority::new(
        env::var(format!("{}_NS", prefix)).unwrap_or_else(|_| default.to_string()),
        env::var(format!("{}_UID", prefix)).unwrap_or_else(|_| default.to_string()),
        env::var(format!("{}_TYPE", prefix)).unwrap_or_else(|_| default.to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_setting() {
        let config = Config::from_env().expect("defaults must parse");
        assert!(!config.pnr.send_parse_orchestration);
        assert!(config.pnr.providers_enrich);
        assert!(config.pnr.facilities_enrich);
        assert!(!config.pnr.patients_auto_register);
        assert_eq!(
            config.requested.ecid,
            AssigningAuthority::new("ECID", "ECID", "ECID")
        );
        assert_eq!(config.resolve_timeout, Duration::from_secs(60));
        assert_eq!(
            config.fhir.enterprise_system,
            "http://openclientregistry.org/fhir/sourceid"
        );
    }

    #[test]
    fn patients_always_enabled() {
        let mut config = Config::from_env().unwrap();
        config.pnr.providers_enrich = false;
        config.pnr.facilities_enrich = false;
        assert!(config.category_enabled(IdCategory::Patient));
        assert!(!config.category_enabled(IdCategory::Provider));
        assert!(!config.category_enabled(IdCategory::Facility));
    }
}
