mod common;

use common::{
    FixedOcr, MockBackend, ScriptedModel, TEXT_REPLY, call_tool, dispatcher, scanned_pdf, text_pdf,
};
use emo_mcp::document::{ExternalError, OcrError, encode_base64};
use serde_json::json;
use std::time::Duration;

fn overloaded() -> Result<String, ExternalError> {
    Err(ExternalError::http(503, "model overloaded"))
}

#[tokio::test]
async fn oversized_payload_never_reaches_model() {
    let model = ScriptedModel::new(vec![Ok(TEXT_REPLY.to_string())]);
    let ocr = FixedOcr::recognized("texto");
    let dispatcher = dispatcher(
        MockBackend::with_rows("casos", Vec::new()),
        model.clone(),
        ocr.clone(),
    );

    let oversized = "A".repeat(28 * 1024 * 1024);
    let result =
        call_tool(&dispatcher, "examenes_analizar", json!({"pdf_base64": oversized})).await;
    assert_eq!(result["isError"], json!(true));
    assert_eq!(result["error_code"], json!("INVALID_DOCUMENT"));
    assert_eq!(model.call_count(), 0);
    assert_eq!(ocr.calls(), 0);
}

#[tokio::test]
async fn non_pdf_is_rejected_before_extraction() {
    let model = ScriptedModel::new(vec![Ok(TEXT_REPLY.to_string())]);
    let ocr = FixedOcr::recognized("texto");
    let dispatcher = dispatcher(
        MockBackend::with_rows("casos", Vec::new()),
        model.clone(),
        ocr.clone(),
    );

    let result = call_tool(
        &dispatcher,
        "examenes_analizar",
        json!({"pdf_base64": encode_base64(b"hello world")}),
    )
    .await;
    assert_eq!(result["error_code"], json!("INVALID_DOCUMENT"));
    assert_eq!(result["error_details"]["validation"]["isValid"], json!(false));
    assert_eq!(model.call_count(), 0);
    assert_eq!(ocr.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_back_off_then_succeed() {
    let model = ScriptedModel::new(vec![overloaded(), overloaded(), Ok(TEXT_REPLY.to_string())]);
    let ocr = FixedOcr::recognized("texto");
    let dispatcher = dispatcher(
        MockBackend::with_rows("casos", Vec::new()),
        model.clone(),
        ocr.clone(),
    );

    let result =
        call_tool(&dispatcher, "examenes_analizar", json!({"pdf_base64": text_pdf()})).await;
    assert!(result.get("isError").is_none(), "{result}");

    let times = model.call_times();
    assert_eq!(times.len(), 3);
    let first_gap = times[1] - times[0];
    let second_gap = times[2] - times[1];
    assert!(first_gap >= Duration::from_millis(1000) && first_gap < Duration::from_millis(2000));
    assert!(second_gap >= Duration::from_millis(2000) && second_gap < Duration::from_millis(3000));
    assert_eq!(ocr.calls(), 0);

    let record = &result["structuredContent"];
    assert_eq!(record["metadata"]["pdf_type"], json!("text"));
    assert_eq!(record["metadata"]["page_count"], json!(2));
    assert_eq!(record["metadata"]["used_ocr"], json!(false));
    assert_eq!(record["metadata"]["preprocessing_applied"], json!(false));
    assert_eq!(record["csv_parseado"]["Centro_Medico"], json!("Clinica Norte"));
    assert_eq!(record["resumen_clinico"], json!("RESUMEN: Trabajador apto sin restricciones."));
    assert_eq!(record["respuesta_completa"], json!(TEXT_REPLY));
}

#[tokio::test(start_paused = true)]
async fn text_document_does_not_fall_back_to_ocr() {
    let model = ScriptedModel::new(vec![overloaded(), overloaded(), overloaded()]);
    let ocr = FixedOcr::recognized("texto");
    let dispatcher = dispatcher(
        MockBackend::with_rows("casos", Vec::new()),
        model.clone(),
        ocr.clone(),
    );

    let result =
        call_tool(&dispatcher, "examenes_analizar", json!({"pdf_base64": text_pdf()})).await;
    assert_eq!(result["error_code"], json!("ANALYSIS_FAILED"));
    assert_eq!(result["error_details"]["last_error_code"], json!("503"));
    assert_eq!(result["error_details"]["attempts"].as_array().map(Vec::len), Some(3));
    assert_eq!(model.call_count(), 3);
    assert_eq!(ocr.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn scanned_document_recovers_through_ocr() {
    let model = ScriptedModel::new(vec![
        overloaded(),
        overloaded(),
        overloaded(),
        Ok(TEXT_REPLY.to_string()),
    ]);
    let ocr = FixedOcr::recognized("FECHA 15/03/2024 CLINICA NORTE");
    let dispatcher = dispatcher(
        MockBackend::with_rows("casos", Vec::new()),
        model.clone(),
        ocr.clone(),
    );

    let result =
        call_tool(&dispatcher, "examenes_analizar", json!({"pdf_base64": scanned_pdf()})).await;
    assert!(result.get("isError").is_none(), "{result}");
    assert_eq!(result["structuredContent"]["metadata"]["used_ocr"], json!(true));
    assert_eq!(result["structuredContent"]["metadata"]["is_scanned"], json!(true));
    assert_eq!(ocr.calls(), 1);
    assert_eq!(model.inline_flags(), vec![true, true, true, false]);
}

#[tokio::test(start_paused = true)]
async fn scanned_document_reports_both_failures() {
    let model = ScriptedModel::new(vec![overloaded(), overloaded(), overloaded()]);
    let ocr = FixedOcr::new(Err(OcrError::NotImplemented));
    let dispatcher = dispatcher(
        MockBackend::with_rows("casos", Vec::new()),
        model.clone(),
        ocr.clone(),
    );

    let result =
        call_tool(&dispatcher, "examenes_analizar", json!({"pdf_base64": scanned_pdf()})).await;
    assert_eq!(result["error_code"], json!("OCR_FALLBACK_FAILED"));
    let details = &result["error_details"];
    assert_eq!(details["primary_error"]["message"], json!("model overloaded"));
    assert_eq!(
        details["ocr_error"],
        json!(OcrError::NotImplemented.to_string())
    );
    assert_eq!(ocr.calls(), 1);
    assert_eq!(model.call_count(), 3);
}

#[tokio::test]
async fn json_reply_is_accepted() {
    let reply =
        "```json\n{\"resumen_clinico\": \"Apto\", \"csv_parseado\": {\"DNI\": \"12345678\"}}\n```";
    let model = ScriptedModel::new(vec![Ok(reply.to_string())]);
    let dispatcher = dispatcher(
        MockBackend::with_rows("casos", Vec::new()),
        model,
        FixedOcr::recognized("texto"),
    );

    let result =
        call_tool(&dispatcher, "examenes_analizar", json!({"pdf_base64": text_pdf()})).await;
    assert_eq!(result["structuredContent"]["resumen_clinico"], json!("Apto"));
    assert_eq!(result["structuredContent"]["csv_parseado"]["DNI"], json!("12345678"));
    assert!(result["structuredContent"]["csv"].is_null());
}

#[tokio::test]
async fn unparseable_reply_keeps_raw_text() {
    let model = ScriptedModel::new(vec![Ok("no table here".to_string())]);
    let dispatcher = dispatcher(
        MockBackend::with_rows("casos", Vec::new()),
        model,
        FixedOcr::recognized("texto"),
    );

    let result =
        call_tool(&dispatcher, "examenes_analizar", json!({"pdf_base64": text_pdf()})).await;
    assert_eq!(result["error_code"], json!("PARSE_ERROR"));
    assert_eq!(result["error_details"]["raw_response"], json!("no table here"));
}

#[tokio::test]
async fn analysis_is_never_cached() {
    let model = ScriptedModel::new(vec![Ok(TEXT_REPLY.to_string()), Ok(TEXT_REPLY.to_string())]);
    let dispatcher = dispatcher(
        MockBackend::with_rows("casos", Vec::new()),
        model.clone(),
        FixedOcr::recognized("texto"),
    );
    let args = json!({"pdf_base64": text_pdf()});

    call_tool(&dispatcher, "examenes_analizar", args.clone()).await;
    call_tool(&dispatcher, "examenes_analizar", args).await;
    assert_eq!(model.call_count(), 2);
    assert!(dispatcher.router().cache().is_empty());
}
