//! 分诊队列演示程序
//!
//! 用手动时钟模拟一个急诊班次：登记、分诊、超时升级、接诊和重新分诊

use anyhow::Result;
use chrono::{Duration, Utc};
use std::sync::Arc;
use triage_core::utils::format_wait;
use triage_workflow::ManualClock;
use triage::{AcuityClassifier, ClassifierConfig, SlaPolicy, TriageEngine, TriageRequest, TriageService, VitalSigns};
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt::init();

    let start = Utc::now();
    let clock = Arc::new(ManualClock::new(start));
    let classifier = AcuityClassifier::new(ClassifierConfig::default())?;
    let service = TriageService::with_clock(TriageEngine::new(classifier, SlaPolicy::default()), clock.clone());

    println!("🚑 急诊分诊队列演示\n");

    // 1. 三位患者相隔一分钟到达
    let arrivals = [
        ("ankle sprain after football", None),
        ("crushing chest pain radiating to left arm", None),
        ("fever and cough for three days", Some(38.9)),
    ];

    let mut ids = Vec::new();
    for (complaint, temperature) in arrivals {
        let record = service.register_arrival(Uuid::new_v4(), complaint).await;

        let vital_signs = temperature.map(|t| VitalSigns {
            temperature: Some(t),
            ..VitalSigns::empty(service.now())
        });
        let request = TriageRequest {
            vital_signs,
            ..Default::default()
        };
        let triaged = service.triage(record.id, request).await?;

        if let Some(level) = triaged.acuity {
            println!("📋 {} -> {}", triaged.chief_complaint, level);
        }
        ids.push(triaged.id);
        clock.advance(Duration::minutes(1));
    }

    // 2. 按接诊顺序显示候诊队列
    println!("\n📊 候诊队列:");
    for record in service.waiting().await {
        println!(
            "   - {} [{:?}] 已等待 {}",
            record.chief_complaint,
            record.acuity,
            format_wait(record.waited(service.now()))
        );
    }

    // 3. 两小时无人接诊，检查超时
    clock.advance(Duration::hours(2));
    let events = service.sweep().await;
    println!("\n⏰ 超时检查产生 {} 个升级事件:", events.len());
    for event in &events {
        println!("   - 就诊 {} ({:?}) 超出 {}", event.intake_id, event.acuity, format_wait(event.overrun()));
    }
    println!("   再次检查: {} 个新事件", service.sweep().await.len());

    // 4. 医生依次接诊
    let clinician = Uuid::new_v4();
    if let Some(record) = service.claim(clinician).await? {
        println!("\n👩‍⚕️ 接诊: {} ({:?})", record.chief_complaint, record.acuity);
        service.complete(record.id).await?;
    }

    // 5. 扭伤患者病情变化，重新分诊
    if let Some(&sprain) = ids.first() {
        let request = TriageRequest {
            chief_complaint: Some("ankle sprain, now unresponsive".to_string()),
            ..Default::default()
        };
        let updated = service.triage(sprain, request).await?;
        println!("\n🔄 重新分诊: {:?}, SLA截止时间仍以到达时间为准: {:?}", updated.acuity, updated.sla_deadline);
    }

    while let Some(record) = service.claim(clinician).await? {
        println!("👩‍⚕️ 接诊: {} ({:?})", record.chief_complaint, record.acuity);
    }

    let stats = service.stats().await;
    println!("\n📈 统计: 候诊 {}, 接诊中 {}, 累计升级 {}", stats.waiting, stats.in_service, stats.total_escalations);
    println!("\n✅ 演示完成！");
    Ok(())
}
