mod common;

use ans_pipeline::apis::catalog::scan_catalog;
use ans_pipeline::apis::registry::download_registry;
use ans_pipeline::error::PipelineError;
use common::{FakeHttp, ROOT};
use tempfile::tempdir;

const FOLDER: &str = "http://ans.test/FTP/PDA/demonstracoes_contabeis/";

fn portal() -> FakeHttp {
    FakeHttp::new()
        .page(
            ROOT,
            &["demonstracoes_contabeis/", "operadoras_de_plano_de_saude_ativas/", "outros_dados/"],
        )
        .page(FOLDER, &["2020/", "2021/", "2022/", "2023/", "leiame.pdf"])
        .page(
            &format!("{FOLDER}2020/"),
            &["2020_1_trimestre.zip", "2020_2_trimestre.zip", "2020_3_trimestre.zip", "2020_4_trimestre.zip"],
        )
        .page(&format!("{FOLDER}2021/"), &["1T2021.zip", "2T2021.zip", "3T2021.zip", "4T2021.zip"])
        .page(&format!("{FOLDER}2022/"), &["1T2022.zip", "2T2022.zip", "3T2022.zip", "4T2022.zip"])
        .page(
            &format!("{FOLDER}2023/"),
            &["1T2023.zip", "2T2023.zip", "3T2023.zip", "4T2023.zip", "dicionario.zip", "notas.pdf"],
        )
}

#[tokio::test]
async fn selects_the_three_most_recent_quarters() -> anyhow::Result<()> {
    let http = portal();
    let entries = scan_catalog(&http, ROOT, "demonstracoes_contabeis").await?;

    let periods: Vec<String> = entries.iter().map(|e| e.period().to_string()).collect();
    assert_eq!(periods, vec!["2023Q2", "2023Q3", "2023Q4"]);
    assert_eq!(entries[0].remote_url, format!("{FOLDER}2023/2T2023.zip"));
    Ok(())
}

#[tokio::test]
async fn legacy_names_are_ranked_with_modern_ones() -> anyhow::Result<()> {
    let http = FakeHttp::new()
        .page(ROOT, &["demonstracoes_contabeis/"])
        .page(FOLDER, &["2019/", "2020/"])
        .page(&format!("{FOLDER}2019/"), &["2019_3_trimestre.zip", "2019_4_trimestre.zip"])
        .page(&format!("{FOLDER}2020/"), &["1T2020.zip"]);

    let entries = scan_catalog(&http, ROOT, "demonstracoes_contabeis").await?;
    let names: Vec<&str> = entries.iter().map(|e| e.remote_url.rsplit('/').next().unwrap()).collect();
    assert_eq!(names, vec!["2019_3_trimestre.zip", "2019_4_trimestre.zip", "1T2020.zip"]);
    Ok(())
}

#[tokio::test]
async fn missing_folder_is_a_discovery_error() {
    let http = FakeHttp::new().page(ROOT, &["outros_dados/"]);
    let err = scan_catalog(&http, ROOT, "demonstracoes_contabeis").await.unwrap_err();
    assert!(matches!(err, PipelineError::Discovery(_)));
}

#[tokio::test]
async fn listing_failure_is_a_network_error() {
    let http = FakeHttp::new();
    let err = scan_catalog(&http, ROOT, "demonstracoes_contabeis").await.unwrap_err();
    assert!(matches!(err, PipelineError::Network { status: 404, .. }));
}

#[tokio::test]
async fn registry_is_the_last_csv_in_the_listing() -> anyhow::Result<()> {
    let registry_folder = "http://ans.test/FTP/PDA/operadoras_de_plano_de_saude_ativas/";
    let http = portal()
        .page(registry_folder, &["Relatorio_cadop_antigo.csv", "Relatorio_cadop.csv", "leiame.odt"])
        .file(&format!("{registry_folder}Relatorio_cadop.csv"), b"Registro_Operadora;CNPJ\n1;2\n".to_vec());

    let dir = tempdir()?;
    let dest = dir.path().join("processed").join("cadastro.csv");
    let downloaded = download_registry(&http, ROOT, "operadoras_de_plano_de_saude_ativas", &dest).await?;

    assert!(downloaded.url.ends_with("/Relatorio_cadop.csv"));
    assert_eq!(downloaded.bytes, 28);
    assert_eq!(std::fs::read_to_string(&dest)?, "Registro_Operadora;CNPJ\n1;2\n");
    Ok(())
}

#[tokio::test]
async fn registry_folder_without_csv_is_a_discovery_error() {
    let registry_folder = "http://ans.test/FTP/PDA/operadoras_de_plano_de_saude_ativas/";
    let http = portal().page(registry_folder, &["leiame.odt"]);
    let dir = tempdir().unwrap();
    let err = download_registry(&http, ROOT, "operadoras_de_plano_de_saude_ativas", &dir.path().join("r.csv"))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Discovery(_)));
}
