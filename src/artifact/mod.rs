//! Binary artifact container shared by all persisted stages.
//!
//! Layout: 8-byte magic, little-endian `u32` header length, JSON header,
//! raw little-endian payload, trailing xxh3-64 checksum over all preceding
//! bytes.  Artifacts are immutable once published and written atomically
//! (write-then-rename), so concurrent readers need no locking.

use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::common::io::atomic_write;
use crate::config::{Config, CorrelationMethod, FdrMethod, Normalization, SignVariant};
use crate::error::WorkerError;
use crate::network::SpeciesNetwork;
use crate::pair::assemble::{PairData, PairNetworks, PairRow};
use crate::pair::test::ComparisonRow;

/// Magic of species-network artifacts.
pub const MAGIC_SPECIES_NETWORK: &[u8; 8] = b"SPNET01\0";
/// Magic of filtered pair-data artifacts.
pub const MAGIC_PAIR_DATA: &[u8; 8] = b"PRDATA1\0";
/// Magic of filtered pair-network artifacts.
pub const MAGIC_PAIR_NETWORKS: &[u8; 8] = b"PRNET01\0";
/// Magic of per-pair comparison artifacts.
pub const MAGIC_PAIR_COMPARISON: &[u8; 8] = b"PRCMP01\0";
/// Magic of clique artifacts.
pub const MAGIC_CLIQUES: &[u8; 8] = b"CLIQ01\0\0";

fn write_container<H: Serialize>(
    path: &Path,
    magic: &[u8; 8],
    header: &H,
    payload: &[u8],
) -> Result<(), WorkerError> {
    let header_json = serde_json::to_vec(header)
        .map_err(|e| WorkerError::ArtifactCorrupt(format!("cannot encode header: {}", e)))?;
    let mut buf = Vec::with_capacity(8 + 4 + header_json.len() + payload.len() + 8);
    buf.extend_from_slice(magic);
    let mut len_bytes = [0u8; 4];
    LittleEndian::write_u32(&mut len_bytes, header_json.len() as u32);
    buf.extend_from_slice(&len_bytes);
    buf.extend_from_slice(&header_json);
    buf.extend_from_slice(payload);
    let checksum = xxhash_rust::xxh3::xxh3_64(&buf);
    let mut checksum_bytes = [0u8; 8];
    LittleEndian::write_u64(&mut checksum_bytes, checksum);
    buf.extend_from_slice(&checksum_bytes);
    atomic_write(path, &buf)
        .map_err(|e| WorkerError::ArtifactCorrupt(format!("cannot write {:?}: {}", path, e)))
}

fn read_container<H: DeserializeOwned>(
    path: &Path,
    magic: &[u8; 8],
) -> Result<(H, Vec<u8>), WorkerError> {
    let data = std::fs::read(path)
        .map_err(|e| WorkerError::ArtifactCorrupt(format!("cannot read {:?}: {}", path, e)))?;
    if data.len() < 8 + 4 + 8 {
        return Err(WorkerError::ArtifactCorrupt(format!(
            "{:?} is truncated ({} bytes)",
            path,
            data.len()
        )));
    }
    let body_end = data.len() - 8;
    let stored = LittleEndian::read_u64(&data[body_end..]);
    let computed = xxhash_rust::xxh3::xxh3_64(&data[..body_end]);
    if stored != computed {
        return Err(WorkerError::ArtifactCorrupt(format!(
            "checksum mismatch in {:?}",
            path
        )));
    }
    if &data[..8] != magic {
        return Err(WorkerError::ArtifactCorrupt(format!(
            "magic mismatch in {:?}: expected {:?}",
            path,
            String::from_utf8_lossy(magic)
        )));
    }
    let header_len = LittleEndian::read_u32(&data[8..12]) as usize;
    if 12 + header_len > body_end {
        return Err(WorkerError::ArtifactCorrupt(format!(
            "header length out of bounds in {:?}",
            path
        )));
    }
    let header: H = serde_json::from_slice(&data[12..12 + header_len])
        .map_err(|e| WorkerError::ArtifactCorrupt(format!("bad header in {:?}: {}", path, e)))?;
    Ok((header, data[12 + header_len..body_end].to_vec()))
}

fn f64s_to_bytes(values: &[f64]) -> Vec<u8> {
    let mut bytes = vec![0u8; values.len() * 8];
    LittleEndian::write_f64_into(values, &mut bytes);
    bytes
}

fn bytes_to_f64s(bytes: &[u8]) -> Vec<f64> {
    let mut values = vec![0f64; bytes.len() / 8];
    LittleEndian::read_f64_into(bytes, &mut values);
    values
}

fn matrix_to_bytes(matrix: &ndarray::Array2<f64>) -> Vec<u8> {
    let flat: Vec<f64> = matrix.iter().copied().collect();
    f64s_to_bytes(&flat)
}

fn bytes_to_matrix(bytes: &[u8], n: usize) -> Result<ndarray::Array2<f64>, WorkerError> {
    ndarray::Array2::from_shape_vec((n, n), bytes_to_f64s(bytes))
        .map_err(|e| WorkerError::ArtifactCorrupt(format!("bad matrix shape: {}", e)))
}

fn signs_to_bytes(signs: &ndarray::Array2<i8>) -> Vec<u8> {
    signs.iter().map(|v| *v as u8).collect()
}

fn bytes_to_signs(bytes: &[u8], n: usize) -> Result<ndarray::Array2<i8>, WorkerError> {
    ndarray::Array2::from_shape_vec((n, n), bytes.iter().map(|b| *b as i8).collect())
        .map_err(|e| WorkerError::ArtifactCorrupt(format!("bad sign plane shape: {}", e)))
}

/// Header of a species-network artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeciesNetworkHeader {
    /// Species identifier.
    pub species: String,
    /// Tissue identifier.
    pub tissue: String,
    /// Correlation method used.
    pub method: CorrelationMethod,
    /// Sign variant of the network.
    pub sign: SignVariant,
    /// Normalisation used.
    pub normalization: Normalization,
    /// Density parameter.
    pub density: f64,
    /// Density threshold.
    pub tau: f64,
    /// Network configuration hash, hex.
    pub config_hash: String,
    /// Creation timestamp, RFC 3339.
    pub created: String,
    /// Worker version that wrote the artifact.
    pub worker_version: String,
    /// Gene labels, row order.
    pub genes: Vec<String>,
    /// Whether an `i8` sign plane follows the matrix.
    pub has_sign_plane: bool,
}

/// Persist a species network.
pub fn write_species_network(
    path: &Path,
    network: &SpeciesNetwork,
    config: &Config,
) -> Result<(), WorkerError> {
    let header = SpeciesNetworkHeader {
        species: network.species.clone(),
        tissue: network.tissue.clone(),
        method: config.correlation_method,
        sign: network.variant,
        normalization: config.normalization,
        density: config.density_threshold,
        tau: network.tau,
        config_hash: format!("{:016x}", config.network_hash()),
        created: chrono::Utc::now().to_rfc3339(),
        worker_version: crate::common::worker_version().to_string(),
        genes: network.genes.clone(),
        has_sign_plane: network.signs.is_some(),
    };
    let mut payload = matrix_to_bytes(&network.matrix);
    if let Some(signs) = &network.signs {
        payload.extend_from_slice(&signs_to_bytes(signs));
    }
    write_container(path, MAGIC_SPECIES_NETWORK, &header, &payload)
}

/// Load a species network.
pub fn read_species_network(
    path: &Path,
) -> Result<(SpeciesNetworkHeader, SpeciesNetwork), WorkerError> {
    let (header, payload): (SpeciesNetworkHeader, Vec<u8>) =
        read_container(path, MAGIC_SPECIES_NETWORK)?;
    let n = header.genes.len();
    let matrix_len = n * n * 8;
    let expected = matrix_len + if header.has_sign_plane { n * n } else { 0 };
    if payload.len() != expected {
        return Err(WorkerError::ArtifactCorrupt(format!(
            "payload size mismatch in {:?}: expected {}, got {}",
            path,
            expected,
            payload.len()
        )));
    }
    let matrix = bytes_to_matrix(&payload[..matrix_len], n)?;
    let signs = if header.has_sign_plane {
        Some(bytes_to_signs(&payload[matrix_len..], n)?)
    } else {
        None
    };
    let network = SpeciesNetwork {
        species: header.species.clone(),
        tissue: header.tissue.clone(),
        genes: header.genes.clone(),
        matrix,
        signs,
        tau: header.tau,
        variant: header.sign,
    };
    Ok((header, network))
}

/// Header of a filtered pair-data artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairDataHeader {
    /// Lexicographically smaller species.
    pub species_a: String,
    /// Lexicographically larger species.
    pub species_b: String,
    /// Tissue identifier.
    pub tissue: String,
    /// Pair configuration hash, hex.
    pub config_hash: String,
    /// Creation timestamp, RFC 3339.
    pub created: String,
    /// Worker version that wrote the artifact.
    pub worker_version: String,
    /// Orthogroup label table.
    pub hogs: Vec<String>,
    /// Species-a gene label table.
    pub genes_a: Vec<String>,
    /// Species-b gene label table.
    pub genes_b: Vec<String>,
    /// Number of ortholog-pair rows.
    pub n_rows: usize,
}

/// Persist the expanded ortholog-pair table.
pub fn write_pair_data(path: &Path, data: &PairData, config: &Config) -> Result<(), WorkerError> {
    let header = PairDataHeader {
        species_a: data.species_a.clone(),
        species_b: data.species_b.clone(),
        tissue: data.tissue.clone(),
        config_hash: format!("{:016x}", config.pair_hash()),
        created: chrono::Utc::now().to_rfc3339(),
        worker_version: crate::common::worker_version().to_string(),
        hogs: data.hogs.clone(),
        genes_a: data.genes_a.clone(),
        genes_b: data.genes_b.clone(),
        n_rows: data.rows.len(),
    };
    let mut payload = Vec::with_capacity(data.rows.len() * 12);
    let mut buf = [0u8; 4];
    for row in &data.rows {
        for value in [row.hog, row.a, row.b] {
            LittleEndian::write_u32(&mut buf, value);
            payload.extend_from_slice(&buf);
        }
    }
    write_container(path, MAGIC_PAIR_DATA, &header, &payload)
}

/// Load the expanded ortholog-pair table.
pub fn read_pair_data(path: &Path) -> Result<(PairDataHeader, PairData), WorkerError> {
    let (header, payload): (PairDataHeader, Vec<u8>) = read_container(path, MAGIC_PAIR_DATA)?;
    if payload.len() != header.n_rows * 12 {
        return Err(WorkerError::ArtifactCorrupt(format!(
            "payload size mismatch in {:?}",
            path
        )));
    }
    let mut rows = Vec::with_capacity(header.n_rows);
    for chunk in payload.chunks_exact(12) {
        rows.push(PairRow {
            hog: LittleEndian::read_u32(&chunk[0..4]),
            a: LittleEndian::read_u32(&chunk[4..8]),
            b: LittleEndian::read_u32(&chunk[8..12]),
        });
    }
    let data = PairData {
        species_a: header.species_a.clone(),
        species_b: header.species_b.clone(),
        tissue: header.tissue.clone(),
        hogs: header.hogs.clone(),
        genes_a: header.genes_a.clone(),
        genes_b: header.genes_b.clone(),
        rows,
    };
    Ok((header, data))
}

/// Header of a filtered pair-network artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairNetworksHeader {
    /// Lexicographically smaller species.
    pub species_a: String,
    /// Lexicographically larger species.
    pub species_b: String,
    /// Tissue identifier.
    pub tissue: String,
    /// Sign variant.
    pub sign: SignVariant,
    /// Recalibrated threshold of species a.
    pub tau_a: f64,
    /// Recalibrated threshold of species b.
    pub tau_b: f64,
    /// Pair configuration hash, hex.
    pub config_hash: String,
    /// Creation timestamp, RFC 3339.
    pub created: String,
    /// Worker version that wrote the artifact.
    pub worker_version: String,
    /// Species-a gene label table.
    pub genes_a: Vec<String>,
    /// Species-b gene label table.
    pub genes_b: Vec<String>,
    /// Whether `i8` sign planes follow the two matrices.
    pub has_sign_planes: bool,
}

/// Persist the restricted pair networks.
pub fn write_pair_networks(
    path: &Path,
    networks: &PairNetworks,
    config: &Config,
) -> Result<(), WorkerError> {
    let header = PairNetworksHeader {
        species_a: networks.species_a.clone(),
        species_b: networks.species_b.clone(),
        tissue: networks.tissue.clone(),
        sign: networks.variant,
        tau_a: networks.tau_a,
        tau_b: networks.tau_b,
        config_hash: format!("{:016x}", config.pair_hash()),
        created: chrono::Utc::now().to_rfc3339(),
        worker_version: crate::common::worker_version().to_string(),
        genes_a: networks.genes_a.clone(),
        genes_b: networks.genes_b.clone(),
        has_sign_planes: networks.signs_a.is_some(),
    };
    let mut payload = matrix_to_bytes(&networks.net_a);
    payload.extend_from_slice(&matrix_to_bytes(&networks.net_b));
    if let (Some(signs_a), Some(signs_b)) = (&networks.signs_a, &networks.signs_b) {
        payload.extend_from_slice(&signs_to_bytes(signs_a));
        payload.extend_from_slice(&signs_to_bytes(signs_b));
    }
    write_container(path, MAGIC_PAIR_NETWORKS, &header, &payload)
}

/// Load the restricted pair networks.
pub fn read_pair_networks(path: &Path) -> Result<(PairNetworksHeader, PairNetworks), WorkerError> {
    let (header, payload): (PairNetworksHeader, Vec<u8>) =
        read_container(path, MAGIC_PAIR_NETWORKS)?;
    let na = header.genes_a.len();
    let nb = header.genes_b.len();
    let matrices_len = (na * na + nb * nb) * 8;
    let expected = matrices_len
        + if header.has_sign_planes {
            na * na + nb * nb
        } else {
            0
        };
    if payload.len() != expected {
        return Err(WorkerError::ArtifactCorrupt(format!(
            "payload size mismatch in {:?}",
            path
        )));
    }
    let net_a = bytes_to_matrix(&payload[..na * na * 8], na)?;
    let net_b = bytes_to_matrix(&payload[na * na * 8..matrices_len], nb)?;
    let (signs_a, signs_b) = if header.has_sign_planes {
        let signs_a = bytes_to_signs(&payload[matrices_len..matrices_len + na * na], na)?;
        let signs_b = bytes_to_signs(&payload[matrices_len + na * na..], nb)?;
        (Some(signs_a), Some(signs_b))
    } else {
        (None, None)
    };
    let networks = PairNetworks {
        species_a: header.species_a.clone(),
        species_b: header.species_b.clone(),
        tissue: header.tissue.clone(),
        variant: header.sign,
        genes_a: header.genes_a.clone(),
        genes_b: header.genes_b.clone(),
        net_a,
        net_b,
        signs_a,
        signs_b,
        tau_a: header.tau_a,
        tau_b: header.tau_b,
    };
    Ok((header, networks))
}

/// Header of a per-pair comparison artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonHeader {
    /// Lexicographically smaller species.
    pub species_a: String,
    /// Lexicographically larger species.
    pub species_b: String,
    /// Tissue identifier.
    pub tissue: String,
    /// Sign variant.
    pub sign: SignVariant,
    /// Recalibrated threshold of species a.
    pub tau_a: f64,
    /// Recalibrated threshold of species b.
    pub tau_b: f64,
    /// Multiple-testing correction applied to the q columns.
    pub fdr_method: FdrMethod,
    /// Pair configuration hash, hex.
    pub config_hash: String,
    /// Creation timestamp, RFC 3339.
    pub created: String,
    /// Worker version that wrote the artifact.
    pub worker_version: String,
    /// Orthogroup label table.
    pub hogs: Vec<String>,
    /// Species-a gene label table.
    pub genes_a: Vec<String>,
    /// Species-b gene label table.
    pub genes_b: Vec<String>,
    /// Number of comparison rows.
    pub n_rows: usize,
}

const COMPARISON_ROW_BYTES: usize = 68;

/// Persist a per-pair comparison table.
pub fn write_comparison(
    path: &Path,
    header: &ComparisonHeader,
    rows: &[ComparisonRow],
) -> Result<(), WorkerError> {
    let mut payload = Vec::with_capacity(rows.len() * COMPARISON_ROW_BYTES);
    let mut u32_buf = [0u8; 4];
    let mut f64_buf = [0u8; 8];
    for row in rows {
        for value in [
            row.hog, row.a, row.b, row.n1, row.k1, row.x1, row.n2, row.k2, row.x2,
        ] {
            LittleEndian::write_u32(&mut u32_buf, value);
            payload.extend_from_slice(&u32_buf);
        }
        for value in [row.q1, row.e1, row.q2, row.e2] {
            LittleEndian::write_f64(&mut f64_buf, value);
            payload.extend_from_slice(&f64_buf);
        }
    }
    write_container(path, MAGIC_PAIR_COMPARISON, header, &payload)
}

/// Load a per-pair comparison table.
pub fn read_comparison(path: &Path) -> Result<(ComparisonHeader, Vec<ComparisonRow>), WorkerError> {
    let (header, payload): (ComparisonHeader, Vec<u8>) =
        read_container(path, MAGIC_PAIR_COMPARISON)?;
    if payload.len() != header.n_rows * COMPARISON_ROW_BYTES {
        return Err(WorkerError::ArtifactCorrupt(format!(
            "payload size mismatch in {:?}",
            path
        )));
    }
    let mut rows = Vec::with_capacity(header.n_rows);
    for chunk in payload.chunks_exact(COMPARISON_ROW_BYTES) {
        rows.push(ComparisonRow {
            hog: LittleEndian::read_u32(&chunk[0..4]),
            a: LittleEndian::read_u32(&chunk[4..8]),
            b: LittleEndian::read_u32(&chunk[8..12]),
            n1: LittleEndian::read_u32(&chunk[12..16]),
            k1: LittleEndian::read_u32(&chunk[16..20]),
            x1: LittleEndian::read_u32(&chunk[20..24]),
            n2: LittleEndian::read_u32(&chunk[24..28]),
            k2: LittleEndian::read_u32(&chunk[28..32]),
            x2: LittleEndian::read_u32(&chunk[32..36]),
            q1: LittleEndian::read_f64(&chunk[36..44]),
            e1: LittleEndian::read_f64(&chunk[44..52]),
            q2: LittleEndian::read_f64(&chunk[52..60]),
            e2: LittleEndian::read_f64(&chunk[60..68]),
        });
    }
    Ok((header, rows))
}

/// Header of a clique artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliquesHeader {
    /// Tissue identifier.
    pub tissue: String,
    /// Sign variant.
    pub sign: SignVariant,
    /// Pair configuration hash, hex.
    pub config_hash: String,
    /// Creation timestamp, RFC 3339.
    pub created: String,
    /// Worker version that wrote the artifact.
    pub worker_version: String,
    /// Number of cliques.
    pub n_cliques: usize,
}

/// Persist the annotated cliques (fast binary companion of the TSV).
pub fn write_cliques(
    path: &Path,
    tissue: &str,
    sign: SignVariant,
    cliques: &[crate::clique::AnnotatedClique],
    config: &Config,
) -> Result<(), WorkerError> {
    let header = CliquesHeader {
        tissue: tissue.to_string(),
        sign,
        config_hash: format!("{:016x}", config.pair_hash()),
        created: chrono::Utc::now().to_rfc3339(),
        worker_version: crate::common::worker_version().to_string(),
        n_cliques: cliques.len(),
    };
    let payload = serde_json::to_vec(cliques)
        .map_err(|e| WorkerError::ArtifactCorrupt(format!("cannot encode cliques: {}", e)))?;
    write_container(path, MAGIC_CLIQUES, &header, &payload)
}

/// Load the annotated cliques.
pub fn read_cliques(
    path: &Path,
) -> Result<(CliquesHeader, Vec<crate::clique::AnnotatedClique>), WorkerError> {
    let (header, payload): (CliquesHeader, Vec<u8>) = read_container(path, MAGIC_CLIQUES)?;
    let cliques: Vec<crate::clique::AnnotatedClique> = serde_json::from_slice(&payload)
        .map_err(|e| WorkerError::ArtifactCorrupt(format!("bad clique payload in {:?}: {}", path, e)))?;
    if cliques.len() != header.n_cliques {
        return Err(WorkerError::ArtifactCorrupt(format!(
            "clique count mismatch in {:?}",
            path
        )));
    }
    Ok((header, cliques))
}

#[cfg(test)]
mod tests {
    use ndarray::array;
    use pretty_assertions::assert_eq;

    use crate::config::{Config, SignVariant};
    use crate::network::SpeciesNetwork;
    use crate::pair::assemble::{PairData, PairRow};

    fn test_config() -> Config {
        toml::from_str(
            r#"
            tissues = ["leaf"]

            [species]
            annual = ["Atha"]
            perennial = ["Aalp"]
            "#,
        )
        .expect("valid config")
    }

    fn network(signed: bool) -> SpeciesNetwork {
        SpeciesNetwork {
            species: "Atha".into(),
            tissue: "leaf".into(),
            genes: vec!["g1".into(), "g2".into()],
            matrix: array![[0.0, 1.5], [1.5, 0.0]],
            signs: signed.then(|| array![[1, -1], [-1, 1]]),
            tau: 1.5,
            variant: if signed {
                SignVariant::Signed
            } else {
                SignVariant::Unsigned
            },
        }
    }

    #[rstest::rstest]
    #[case(false)]
    #[case(true)]
    fn species_network_round_trip(#[case] signed: bool) {
        let tmp = temp_testdir::TempDir::default();
        let path = tmp.join("net.spnet");
        let config = test_config();
        let network = network(signed);

        super::write_species_network(&path, &network, &config).unwrap();
        let (header, loaded) = super::read_species_network(&path).unwrap();

        assert_eq!(header.species, "Atha");
        assert_eq!(header.config_hash, format!("{:016x}", config.network_hash()));
        assert_eq!(loaded.genes, network.genes);
        assert_eq!(loaded.matrix, network.matrix);
        assert_eq!(loaded.signs, network.signs);
        assert_eq!(loaded.tau, network.tau);
        assert_eq!(loaded.variant, network.variant);
    }

    #[test]
    fn flipped_byte_is_detected() {
        let tmp = temp_testdir::TempDir::default();
        let path = tmp.join("net.spnet");
        super::write_species_network(&path, &network(false), &test_config()).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xff;
        std::fs::write(&path, &bytes).unwrap();

        let err = super::read_species_network(&path).unwrap_err();
        assert_eq!(err.kind(), "ArtifactCorrupt");
    }

    #[test]
    fn wrong_magic_is_detected() {
        let tmp = temp_testdir::TempDir::default();
        let path = tmp.join("net.spnet");
        let data = PairData {
            species_a: "Atha".into(),
            species_b: "Esal".into(),
            tissue: "leaf".into(),
            hogs: vec!["H1".into()],
            genes_a: vec!["a1".into()],
            genes_b: vec!["b1".into()],
            rows: vec![PairRow { hog: 0, a: 0, b: 0 }],
        };
        super::write_pair_data(&path, &data, &test_config()).unwrap();

        let err = super::read_species_network(&path).unwrap_err();
        assert_eq!(err.kind(), "ArtifactCorrupt");
    }

    #[test]
    fn pair_data_round_trip() {
        let tmp = temp_testdir::TempDir::default();
        let path = tmp.join("pair.prdata");
        let data = PairData {
            species_a: "Atha".into(),
            species_b: "Esal".into(),
            tissue: "leaf".into(),
            hogs: vec!["H1".into(), "H2".into()],
            genes_a: vec!["a1".into(), "a2".into()],
            genes_b: vec!["b1".into()],
            rows: vec![
                PairRow { hog: 0, a: 0, b: 0 },
                PairRow { hog: 0, a: 1, b: 0 },
                PairRow { hog: 1, a: 1, b: 0 },
            ],
        };

        super::write_pair_data(&path, &data, &test_config()).unwrap();
        let (header, loaded) = super::read_pair_data(&path).unwrap();

        assert_eq!(header.n_rows, 3);
        assert_eq!(loaded.rows, data.rows);
        assert_eq!(loaded.hogs, data.hogs);
        assert_eq!(loaded.genes_a, data.genes_a);
    }
}
