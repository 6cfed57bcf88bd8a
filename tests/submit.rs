mod common;

use nf_annotate::annotate::{AnnotationContext, ManifestRow};
use nf_annotate::annotations::AnnotationValue;
use nf_annotate::classify::classify_outputs;
use nf_annotate::domain::{OutputKind, Workflow};
use nf_annotate::manifest::{KindErrorPolicy, ManifestBundle, build_manifests};
use nf_annotate::samplesheet::{SampleKeyTransform, parse_sample_sheet};
use nf_annotate::submit::{SubmitStatus, submit_manifest, submit_provenance};
use nf_annotate::table::Table;

use common::{MockSynapse, id, sarek_project, standard_schema};

const LINK: &str = "https://nf-co.re/sarek/3.4.0";

fn bundle(client: &MockSynapse) -> ManifestBundle {
    let fileview = id("syn9");
    let classified = classify_outputs(
        client,
        &fileview,
        &id("syn2"),
        Workflow::Sarek,
        &[OutputKind::Strelka2],
    )
    .unwrap();
    let table = Table::from_reader(
        "sample,fastq_1,fastq_2\npatient1,syn300,syn301\n".as_bytes(),
        "sheet",
    )
    .unwrap();
    let inputs = parse_sample_sheet(&table, &SampleKeyTransform::default()).unwrap();
    let ctx = AnnotationContext {
        client,
        fileview: &fileview,
        genomic_reference: "GRCh38",
    };
    build_manifests(
        &ctx,
        &standard_schema(),
        &inputs,
        &classified.outputs,
        LINK,
        KindErrorPolicy::Collect,
    )
    .unwrap()
}

fn rows(bundle: &ManifestBundle) -> &[ManifestRow] {
    &bundle.manifests[&OutputKind::Strelka2]
}

#[test]
fn submission_merges_over_existing_annotations() {
    let client = sarek_project().annotate("syn20", &[("curator", "jd"), ("dataType", "old")]);
    let bundle = bundle(&client);

    let results = submit_manifest(&client, rows(&bundle), false).unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.status == SubmitStatus::Updated));

    let stored = client.stored("syn20");
    assert_eq!(stored["curator"], AnnotationValue::text("jd"));
    assert_eq!(stored["dataType"], AnnotationValue::text("SomaticVariants"));
    assert_eq!(stored["specimenID"], AnnotationValue::text("patient1"));

    let writes = client.annotation_writes.lock().unwrap();
    assert_eq!(writes[0].id, id("syn20"));
    assert_eq!(writes[0].etag, "etag-0");
}

#[test]
fn resubmission_is_unchanged() {
    let client = sarek_project();
    let bundle = bundle(&client);

    submit_manifest(&client, rows(&bundle), false).unwrap();
    let again = submit_manifest(&client, rows(&bundle), false).unwrap();
    assert!(again.iter().all(|r| r.status == SubmitStatus::Unchanged));
    assert!(again.iter().all(|r| r.changed_keys.is_empty()));
    assert_eq!(client.annotation_writes.lock().unwrap().len(), 2);
}

#[test]
fn dry_run_writes_nothing() {
    let client = sarek_project();
    let bundle = bundle(&client);

    let results = submit_manifest(&client, rows(&bundle), true).unwrap();
    assert!(results.iter().all(|r| r.status == SubmitStatus::DryRun));
    assert!(results[0].changed_keys.contains(&"dataType".to_string()));
    assert!(client.annotation_writes.lock().unwrap().is_empty());

    let provenance = submit_provenance(&client, &bundle.linkage, true).unwrap();
    assert_eq!(provenance.len(), 2);
    assert!(provenance.iter().all(|r| r.activity_id.is_none()));
    assert!(client.activities.lock().unwrap().is_empty());
}

#[test]
fn provenance_links_inputs_and_workflow() {
    let client = sarek_project();
    let bundle = bundle(&client);

    let results = submit_provenance(&client, &bundle.linkage, false).unwrap();
    assert_eq!(results[0].activity_id.as_deref(), Some("9001"));

    let activities = client.activities.lock().unwrap();
    assert_eq!(activities.len(), 2);
    assert_eq!(activities[0].name, "Strelka2");
    assert_eq!(activities[0].used, vec![id("syn300"), id("syn301")]);
    assert_eq!(activities[0].executed.as_deref(), Some(LINK));

    let generated = client.generated_by.lock().unwrap();
    assert_eq!(generated[0], ("syn20".to_string(), "9001".to_string()));
    assert_eq!(generated[1], ("syn21".to_string(), "9002".to_string()));
}
