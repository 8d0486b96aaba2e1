//! EC2 instance descriptions

use crate::{cloud_error, cloud_ok};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_ec2::types::{Filter, Instance};
use aws_sdk_ec2::Client;
use esherd::cloud::{InstanceDescriber, InstanceInfo};
use esherd::Result;

/// Filter values per request
const CHUNK: usize = 200;

#[derive(Clone)]
pub struct Ec2Instances {
    client: Client,
}

impl Ec2Instances {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }

    async fn describe_chunk(&self, ids: &[String]) -> Result<Vec<InstanceInfo>> {
        let mut found = Vec::with_capacity(ids.len());
        let mut next_token: Option<String> = None;
        loop {
            // An ID filter tolerates unknown IDs, unlike InstanceIds
            let output = self
                .client
                .describe_instances()
                .filters(
                    Filter::builder()
                        .name("instance-id")
                        .set_values(Some(ids.to_vec()))
                        .build(),
                )
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| cloud_error("DescribeInstances", e))?;
            cloud_ok("DescribeInstances");

            for reservation in output.reservations() {
                found.extend(reservation.instances().iter().filter_map(instance_info));
            }
            match output.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => break,
            }
        }
        Ok(found)
    }
}

/// vCPUs are cores times threads per core
fn instance_info(instance: &Instance) -> Option<InstanceInfo> {
    let id = instance.instance_id()?;
    let cpu = instance.cpu_options()?;
    let cores = cpu.core_count().unwrap_or(0).max(0) as u32;
    let threads = cpu.threads_per_core().unwrap_or(1).max(1) as u32;
    Some(InstanceInfo {
        id: id.to_string(),
        vcpus: cores * threads,
    })
}

#[async_trait]
impl InstanceDescriber for Ec2Instances {
    async fn describe(&self, ids: &[String]) -> Result<Vec<InstanceInfo>> {
        let mut found = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(CHUNK) {
            found.extend(self.describe_chunk(chunk).await?);
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_ec2::types::CpuOptions;

    #[test]
    fn test_vcpus_from_cpu_options() {
        let instance = Instance::builder()
            .instance_id("i-0abc")
            .cpu_options(CpuOptions::builder().core_count(4).threads_per_core(2).build())
            .build();
        assert_eq!(
            instance_info(&instance),
            Some(InstanceInfo {
                id: "i-0abc".into(),
                vcpus: 8
            })
        );
    }

    #[test]
    fn test_instance_without_cpu_options_is_skipped() {
        let instance = Instance::builder().instance_id("i-0abc").build();
        assert_eq!(instance_info(&instance), None);
    }
}
