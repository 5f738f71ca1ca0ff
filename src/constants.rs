/// Remote layout of the ANS open data portal
pub const DEFAULT_ROOT_URL: &str = "https://dadosabertos.ans.gov.br/FTP/PDA/";
pub const DISCLOSURE_FOLDER: &str = "demonstracoes_contabeis";
pub const REGISTRY_FOLDER: &str = "operadoras_de_plano_de_saude_ativas";

pub const ARCHIVE_EXTENSION: &str = ".zip";
pub const REGISTRY_EXTENSION: &str = ".csv";

/// Number of distinct (year, quarter) periods the scanner keeps
pub const RECENT_QUARTERS: usize = 3;

// Normalized source column names
pub const SRC_REGISTRY_ID: &str = "reg_ans";
pub const SRC_AMOUNT: &str = "vl_saldo_final";
pub const SRC_REGISTRY_KEY: &str = "registro_operadora";
pub const SRC_TAX_ID: &str = "cnpj";
pub const SRC_LEGAL_NAME: &str = "razao_social";
pub const SRC_CATEGORY: &str = "modalidade";
pub const SRC_REGION: &str = "uf";

// Output column names
pub const COL_REGISTRY_ID: &str = "RegistroANS";
pub const COL_TAX_ID: &str = "CNPJ";
pub const COL_LEGAL_NAME: &str = "RazaoSocial";
pub const COL_CATEGORY: &str = "Modalidade";
pub const COL_REGION: &str = "UF";
pub const COL_YEAR: &str = "Ano";
pub const COL_QUARTER: &str = "Trimestre";
pub const COL_AMOUNT: &str = "ValorDespesas";
pub const COL_TOTAL: &str = "TotalDespesas";
pub const COL_MEAN: &str = "MediaDespesas";
pub const COL_STDDEV: &str = "DesvioPadraoDespesas";

pub const CONSOLIDATED_COLUMNS: [&str; 4] = [COL_REGISTRY_ID, COL_YEAR, COL_QUARTER, COL_AMOUNT];

pub const ENRICHED_COLUMNS: [&str; 8] = [
    COL_REGISTRY_ID,
    COL_TAX_ID,
    COL_LEGAL_NAME,
    COL_CATEGORY,
    COL_REGION,
    COL_YEAR,
    COL_QUARTER,
    COL_AMOUNT,
];

pub const AGGREGATE_COLUMNS: [&str; 5] = [COL_LEGAL_NAME, COL_REGION, COL_TOTAL, COL_MEAN, COL_STDDEV];

// Stage output file names
pub const MANIFEST_FILE: &str = "manifest.json";
pub const CONSOLIDATED_FILE: &str = "consolidado_despesas.csv";
pub const CONSOLIDATED_ZIP_FILE: &str = "consolidado_despesas.zip";
pub const REGISTRY_FILE: &str = "cadastro_operadoras.csv";
pub const ENRICHED_FILE: &str = "consolidado_enriquecido.csv";
pub const VALIDATED_FILE: &str = "consolidado_enriquecido_validado.csv";
pub const AGGREGATED_FILE: &str = "despesas_agregadas.csv";
pub const DEFAULT_BUNDLE_FILE: &str = "ans_despesas_final.zip";
